// Platform dispatcher tests

use stockpiler::inventory::Device;
use stockpiler::platform::{DispatchError, PlatformRegistry, Procedure};

#[test]
fn test_default_registry_maps_asa_to_dual_transport() {
    let registry = PlatformRegistry::default();
    let asa = Device::new("fw1", "10.0.0.1").with_platform("cisco_asa");
    assert_eq!(registry.resolve(&asa), Ok(Procedure::DualTransport));
}

#[test]
fn test_default_registry_maps_common_platforms_to_generic() {
    let registry = PlatformRegistry::default();
    for platform in ["cisco_ios", "cisco_nxos", "arista_eos", "juniper_junos", "linux"] {
        let d = Device::new("d", "10.0.0.1").with_platform(platform);
        assert_eq!(registry.resolve(&d), Ok(Procedure::Generic), "{}", platform);
    }
}

#[test]
fn test_unknown_platform_is_dispatch_error() {
    let registry = PlatformRegistry::default();
    let d = Device::new("x1", "10.0.0.1").with_platform("acme_os");
    assert_eq!(
        registry.resolve(&d),
        Err(DispatchError::UnknownPlatform {
            device: "x1".into(),
            platform: "acme_os".into(),
        })
    );
}

#[test]
fn test_missing_platform_is_dispatch_error() {
    let registry = PlatformRegistry::default();
    let d = Device::new("x1", "10.0.0.1");
    let err = registry.resolve(&d).unwrap_err();
    assert!(matches!(err, DispatchError::MissingPlatform { .. }));
    assert!(err.to_string().contains("x1"));
}

#[test]
fn test_register_adds_and_replaces() {
    let mut registry = PlatformRegistry::empty();
    assert!(registry.is_empty());
    assert_eq!(registry.register("acme_os", Procedure::Generic), None);
    assert_eq!(
        registry.register("acme_os", Procedure::DualTransport),
        Some(Procedure::Generic)
    );
    assert_eq!(registry.len(), 1);
    let d = Device::new("x1", "10.0.0.1").with_platform("acme_os");
    assert_eq!(registry.resolve(&d), Ok(Procedure::DualTransport));
}
