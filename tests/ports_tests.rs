use scan_orchestrator::ports::{parse_ports_str, profile_ports, resolve};
use scan_orchestrator::types::ScanType;
use scan_orchestrator::ScanError;

#[test]
fn parse_single_and_ranges_sorted_and_deduplicated() {
    let ports = parse_ports_str(" 443, 22 ,8000-8002, 8001,80").expect("parse ok");
    assert_eq!(ports, vec![22, 80, 443, 8000, 8001, 8002]);
}

#[test]
fn invalid_port_rejected() {
    for bad in ["0", "65536", "80,,443", "http", "90-80", ""] {
        assert!(
            matches!(parse_ports_str(bad), Err(ScanError::InvalidPort(_))),
            "{bad:?} should be rejected"
        );
    }
}

#[test]
fn custom_profile_needs_a_port_list() {
    assert!(matches!(
        resolve(ScanType::Custom, None),
        Err(ScanError::InvalidPort(_))
    ));
    assert!(resolve(ScanType::Custom, Some("  ")).is_err());
    assert_eq!(resolve(ScanType::Custom, Some("80,22")).unwrap(), vec![22, 80]);
}

#[test]
fn named_profiles_ignore_custom_ports() {
    let quick = resolve(ScanType::Quick, Some("9999")).unwrap();
    assert_eq!(quick, profile_ports(ScanType::Quick));
    assert!(!quick.contains(&9999));
}

#[test]
fn profiles_nest() {
    let quick = profile_ports(ScanType::Quick);
    let standard = profile_ports(ScanType::Standard);
    let comprehensive = profile_ports(ScanType::Comprehensive);
    assert!(quick.iter().all(|p| standard.contains(p)));
    assert!(standard.iter().all(|p| comprehensive.contains(p)));
    assert!((1..=1024).all(|p| comprehensive.contains(&p)));
    for list in [&quick, &standard, &comprehensive] {
        assert!(list.windows(2).all(|w| w[0] < w[1]));
    }
}
