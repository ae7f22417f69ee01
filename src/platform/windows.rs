// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Windows capture/egress backend: a raw `AF_INET`/`SOCK_RAW` socket bound
//! to `(local_ip, 6000)`, switched into promiscuous receive-all mode with
//! `WSAIoctl(SIO_RCVALL, &TRUE)`.

use crate::error::{Error, Kind};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{self, Read};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::os::windows::io::AsRawSocket;
use std::time::Duration;
use windows_sys::Win32::Networking::WinSock::{
    WSAIoctl, SIO_RCVALL, SOCKET,
};

const RCVALL_ON: u32 = 1;

/// Resolves the first IPv4 address associated with the machine's host
/// name.
pub fn local_ipv4() -> Result<Ipv4Addr, Error> {
    let hostname =
        std::env::var("COMPUTERNAME").map_err(|_| Error::new(Kind::HostAddress))?;

    use std::net::ToSocketAddrs;
    (hostname.as_str(), 0u16)
        .to_socket_addrs()
        .map_err(|_| Error::new(Kind::HostAddress))?
        .find_map(|addr| match addr.ip() {
            std::net::IpAddr::V4(v4) => Some(v4),
            std::net::IpAddr::V6(_) => None,
        })
        .ok_or_else(|| Error::new(Kind::HostAddress))
}

fn enable_receive_all(socket: &Socket) -> io::Result<()> {
    let mut opt: u32 = RCVALL_ON;
    let mut bytes_returned: u32 = 0;

    let rc = unsafe {
        WSAIoctl(
            socket.as_raw_socket() as SOCKET,
            SIO_RCVALL,
            &mut opt as *mut u32 as *mut _,
            std::mem::size_of::<u32>() as u32,
            std::ptr::null_mut(),
            0,
            &mut bytes_returned,
            std::ptr::null_mut(),
            None,
        )
    };

    if rc != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

pub struct Capture {
    socket: Socket,
}

impl Capture {
    pub fn open(local_ip: Ipv4Addr, port: u16, poll_interval: Duration) -> Result<Self, Error> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::from(0)))
            .map_err(|_| Error::new(Kind::Privilege))?;

        let addr: SockAddr = SocketAddrV4::new(local_ip, port).into();
        socket.bind(&addr).map_err(|err| Error::new(Kind::Bind(err)))?;

        enable_receive_all(&socket).map_err(|_| Error::new(Kind::Privilege))?;

        socket
            .set_read_timeout(Some(poll_interval))
            .map_err(|_| Error::new(Kind::PlatformInit))?;

        Ok(Self { socket })
    }
}

impl super::CaptureSocket for Capture {
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.socket).read(buf)
    }

    fn close(&self) {
        let _ = self.socket.shutdown(std::net::Shutdown::Both);
    }
}

pub struct Egress {
    socket: Socket,
    send_lock: parking_lot::Mutex<()>,
}

impl Egress {
    pub fn open() -> Result<Self, Error> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::UDP))
            .map_err(|_| Error::new(Kind::Privilege))?;

        socket
            .set_header_included_v4(true)
            .map_err(|_| Error::new(Kind::Privilege))?;

        Ok(Self {
            socket,
            send_lock: parking_lot::Mutex::new(()),
        })
    }
}

impl super::EgressSocket for Egress {
    fn send_to(&self, buf: &[u8], dst: Ipv4Addr) -> io::Result<usize> {
        let _guard = self.send_lock.lock();
        let addr = SocketAddrV4::new(dst, 0);
        self.socket.send_to(buf, &addr.into())
    }
}
