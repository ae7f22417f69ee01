// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Unix capture/egress backend.
//!
//! The primary capture mechanism here (`WSAIoctl(SIO_RCVALL)`, see
//! `platform::windows`) has no Unix equivalent on an `AF_INET` socket, so
//! this backend substitutes a link-layer (`AF_PACKET`) raw socket on an
//! interface switched into `IFF_PROMISC`, filtered to `ETH_P_IP`. The
//! 14-byte Ethernet header is stripped here so everything above this
//! module still sees "first byte is the IPv4 header", matching the
//! Windows path exactly.

use crate::error::{Error, Kind};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{self, Read};
use std::net::Ipv4Addr;
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

const ETH_P_IP: u16 = 0x0800;
const ETH_HEADER_LEN: usize = 14;

/// Resolves the primary IPv4 address via the host name, matching the
/// resolution used on the Windows path.
pub fn local_ipv4() -> Result<Ipv4Addr, Error> {
    let hostname = nix::unistd::gethostname().map_err(|_| Error::new(Kind::HostAddress))?;
    let hostname = hostname
        .into_string()
        .map_err(|_| Error::new(Kind::HostAddress))?;

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

/// Returns the first non-loopback interface's index, used as the default
/// capture interface.
fn default_interface_index() -> io::Result<i32> {
    let interfaces = nix::ifaddrs::getifaddrs()
        .map_err(|err| io::Error::from_raw_os_error(err as i32))?;

    for iface in interfaces {
        if iface.flags.contains(nix::net::if_::InterfaceFlags::IFF_LOOPBACK) {
            continue;
        }
        if let Ok(index) = nix::net::if_::if_nametoindex(iface.interface_name.as_str()) {
            return Ok(index as i32);
        }
    }

    Err(io::Error::new(io::ErrorKind::NotFound, "no usable interface"))
}

fn set_promiscuous(fd: RawFd, ifindex: i32) -> io::Result<()> {
    // PACKET_ADD_MEMBERSHIP with PACKET_MR_PROMISC is the portable way to
    // flip IFF_PROMISC on the interface for the lifetime of this socket,
    // without mutating the interface's flags for every other process.
    #[repr(C)]
    struct PacketMreq {
        mr_ifindex: libc::c_int,
        mr_type: libc::c_ushort,
        mr_alen: libc::c_ushort,
        mr_address: [u8; 8],
    }

    const PACKET_MR_PROMISC: libc::c_ushort = 1;
    const SOL_PACKET: libc::c_int = 263;
    const PACKET_ADD_MEMBERSHIP: libc::c_int = 1;

    let mreq = PacketMreq {
        mr_ifindex: ifindex,
        mr_type: PACKET_MR_PROMISC,
        mr_alen: 0,
        mr_address: [0; 8],
    };

    let rc = unsafe {
        libc::setsockopt(
            fd,
            SOL_PACKET,
            PACKET_ADD_MEMBERSHIP,
            &mreq as *const _ as *const libc::c_void,
            std::mem::size_of::<PacketMreq>() as libc::socklen_t,
        )
    };

    if rc != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

fn link_layer_sockaddr(ifindex: i32) -> SockAddr {
    unsafe {
        let (_, sockaddr) = SockAddr::try_init(|storage, len| {
            let storage = storage.cast::<libc::sockaddr_ll>();
            let mut addr: libc::sockaddr_ll = std::mem::zeroed();
            addr.sll_family = libc::AF_PACKET as u16;
            addr.sll_protocol = ETH_P_IP.to_be();
            addr.sll_ifindex = ifindex;
            storage.write(addr);
            *len = std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;
            Ok(())
        })
        .expect("constructing a sockaddr_ll cannot fail");
        sockaddr
    }
}

pub struct Capture {
    socket: Socket,
}

impl Capture {
    pub fn open(_local_ip: Ipv4Addr, _port: u16, poll_interval: Duration) -> Result<Self, Error> {
        let domain = Domain::from(libc::AF_PACKET);
        let protocol = Protocol::from(ETH_P_IP.to_be() as i32);

        let socket = Socket::new(domain, Type::RAW, Some(protocol))
            .map_err(|_| Error::new(Kind::Privilege))?;

        let ifindex = default_interface_index().map_err(|_| Error::new(Kind::HostAddress))?;

        set_promiscuous(socket.as_raw_fd(), ifindex).map_err(|_| Error::new(Kind::Privilege))?;

        socket
            .bind(&link_layer_sockaddr(ifindex))
            .map_err(|err| Error::new(Kind::Bind(err)))?;

        socket
            .set_read_timeout(Some(poll_interval))
            .map_err(|_| Error::new(Kind::PlatformInit))?;

        Ok(Self { socket })
    }
}

impl super::CaptureSocket for Capture {
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        // recv into a scratch frame, then strip the Ethernet header so the
        // rest of the pipeline sees the IPv4 header at offset 0.
        let mut frame = vec![0u8; buf.len() + ETH_HEADER_LEN];
        let len = (&self.socket).read(&mut frame)?;

        if len <= ETH_HEADER_LEN {
            return Ok(0);
        }

        let ip_len = len - ETH_HEADER_LEN;
        let ip_len = ip_len.min(buf.len());
        buf[..ip_len].copy_from_slice(&frame[ETH_HEADER_LEN..ETH_HEADER_LEN + ip_len]);
        Ok(ip_len)
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
        let addr = std::net::SocketAddrV4::new(dst, 0);
        self.socket.send_to(buf, &addr.into())
    }
}
