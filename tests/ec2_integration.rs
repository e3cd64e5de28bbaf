//! Integration tests for EC2 seed images

use std::collections::BTreeMap;

use cloud_init_seed::image::{ManifestWriter, assemble_image_to_vec, assemble_with, read_image};
use cloud_init_seed::image::manifest::Manifest;
use cloud_init_seed::{CloudInitError, SeedConfig};

/// An EC2 seed without interfaces has exactly two entries
#[test]
fn test_ec2_image_without_network() {
    let config = SeedConfig::new_ec2().unwrap();
    let image = read_image(&assemble_image_to_vec(&config).unwrap()).unwrap();

    assert_eq!(image.label(), "ec2-seed");
    let mut paths = image.paths();
    paths.sort();
    assert_eq!(
        paths,
        vec!["ec2/latest/meta-data.json", "ec2/latest/user-data"]
    );
    assert!(image.get("ec2/latest/network-data.json").is_none());
}

#[test]
fn test_ec2_manifest_without_network() {
    let config = SeedConfig::new_ec2().unwrap();
    let mut out = Vec::new();
    assemble_with(&ManifestWriter, &config, &mut out).unwrap();

    let manifest: Manifest = serde_json::from_slice(&out).unwrap();
    assert_eq!(manifest.volume_label, "ec2-seed");
    assert_eq!(manifest.entries.len(), 2);
}

#[test]
fn test_ec2_image_with_metadata_and_network() {
    let mut config = SeedConfig::new_ec2().unwrap();
    config.set_fqdn("web-1.example.com");
    config
        .set_ec2_metadata(
            "i-0123456789abcdef0",
            "us-east-1a",
            BTreeMap::from([("Name".to_string(), "web-1".to_string())]),
        )
        .unwrap();
    config
        .set_ec2_ipv4("172.31.16.100", Some("3.3.3.3".to_string()))
        .unwrap();
    config.set_static_interface("0a:00:00:00:00:01", "172.31.16.100/20", "172.31.16.1", &["169.254.169.253"]);

    let image = read_image(&assemble_image_to_vec(&config).unwrap()).unwrap();
    assert_eq!(image.entries.len(), 3);

    let meta: serde_json::Value =
        serde_json::from_slice(&image.get("ec2/latest/meta-data.json").unwrap().content).unwrap();
    assert_eq!(meta["instance-id"], "i-0123456789abcdef0");
    assert_eq!(meta["local-hostname"], "web-1.example.com");
    assert_eq!(meta["availability-zone"], "us-east-1a");
    assert_eq!(meta["public-ipv4"], "3.3.3.3");
    assert_eq!(meta["tags"]["Name"], "web-1");

    let network: serde_json::Value = serde_json::from_slice(
        &image.get("ec2/latest/network-data.json").unwrap().content,
    )
    .unwrap();
    let iface = &network["interfaces"][0];
    assert_eq!(iface["mac"], "0a:00:00:00:00:01");
    assert_eq!(iface["ip"], "172.31.16.100/20");
    assert_eq!(iface["gateway"], "172.31.16.1");
    assert_eq!(iface["dns"][0], "169.254.169.253");
}

#[test]
fn test_gce_setters_rejected_on_ec2() {
    let mut config = SeedConfig::new_ec2().unwrap();
    let err = config
        .set_gce_metadata("web-1", "us-central1-a", "proj")
        .unwrap_err();
    assert!(matches!(err, CloudInitError::MetadataMismatch { .. }));
    assert!(err.to_string().contains("GCE"));
}
