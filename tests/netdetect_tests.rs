use ipnet::Ipv4Net;
use scan_orchestrator::netdetect::{expand_cidr_to_ips, ipv4_to_default_cidr};
use std::net::{IpAddr, Ipv4Addr};

fn v4(ips: Vec<IpAddr>) -> Vec<Ipv4Addr> {
    ips.into_iter()
        .map(|ip| match ip {
            IpAddr::V4(v) => v,
            _ => unreachable!(),
        })
        .collect()
}

#[test]
fn default_cidr_is_24() {
    let cidr = ipv4_to_default_cidr(Ipv4Addr::new(192, 168, 42, 99)).unwrap();
    assert_eq!(cidr.to_string(), "192.168.42.0/24");
}

#[test]
fn expand_excludes_network_and_broadcast() {
    let net = Ipv4Net::new(Ipv4Addr::new(10, 0, 0, 0), 30).unwrap();
    let list = v4(expand_cidr_to_ips(ipnet::IpNet::V4(net)));
    assert_eq!(
        list,
        vec![Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)]
    );
}

#[test]
fn point_to_point_and_host_blocks_keep_every_address() {
    let p2p = Ipv4Net::new(Ipv4Addr::new(10, 0, 0, 4), 31).unwrap();
    assert_eq!(v4(expand_cidr_to_ips(p2p.into())).len(), 2);

    let host = Ipv4Net::new(Ipv4Addr::new(10, 0, 0, 9), 32).unwrap();
    assert_eq!(
        v4(expand_cidr_to_ips(host.into())),
        vec![Ipv4Addr::new(10, 0, 0, 9)]
    );
}
