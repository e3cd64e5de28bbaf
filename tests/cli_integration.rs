//! Integration tests for the cloud-init-seed binary

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

use cloud_init_seed::image::read_image;

const PROFILE: &str = r#"
datasource: nocloud
fqdn: builder.example.com
packages: [curl]
interfaces:
  - mac: AA:BB:CC:00:00:01
    address: 10.1.0.10/16
    gateway: 10.1.0.1
    nameservers: [10.1.0.2]
"#;

fn seed_cmd(args: &[&str], envs: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_cloud-init-seed"));
    cmd.args(args).env_remove("SOURCE_DATE_EPOCH");
    for (key, value) in envs {
        cmd.env(key, value);
    }
    cmd.output().unwrap()
}

fn write_profile(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn test_build_writes_image() {
    let temp = TempDir::new().unwrap();
    let profile = write_profile(temp.path(), "seed.yaml", PROFILE);
    let output = temp.path().join("seed.iso");

    let result = seed_cmd(
        &["build", "--profile", &profile, "--output", output.to_str().unwrap()],
        &[],
    );
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));

    let image = read_image(&fs::read(&output).unwrap()).unwrap();
    assert_eq!(image.label(), "cidata");
    assert_eq!(image.entries.len(), 3);

    // No temporary file is left behind
    let leftovers: Vec<_> = fs::read_dir(temp.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_build_is_reproducible_with_source_date_epoch() {
    let temp = TempDir::new().unwrap();
    let profile = write_profile(temp.path(), "seed.yaml", PROFILE);
    let first = temp.path().join("first.iso");
    let second = temp.path().join("second.iso");

    for output in [&first, &second] {
        let result = seed_cmd(
            &["build", "-p", &profile, "-o", output.to_str().unwrap()],
            &[("SOURCE_DATE_EPOCH", "1700000000")],
        );
        assert!(result.status.success());
    }

    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
}

#[test]
fn test_invalid_source_date_epoch_leaves_no_output() {
    let temp = TempDir::new().unwrap();
    let profile = write_profile(temp.path(), "seed.yaml", PROFILE);
    let output = temp.path().join("seed.iso");

    let result = seed_cmd(
        &["build", "-p", &profile, "-o", output.to_str().unwrap()],
        &[("SOURCE_DATE_EPOCH", "not-a-number")],
    );

    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("open"));
    assert!(!output.exists());
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
}

#[test]
fn test_render_documents() {
    let temp = TempDir::new().unwrap();
    let profile = write_profile(temp.path(), "seed.yaml", PROFILE);

    let result = seed_cmd(&["render", "-p", &profile, "meta-data"], &[]);
    assert!(result.status.success());
    assert_eq!(
        String::from_utf8(result.stdout).unwrap(),
        "instance-id: builder\nlocal-hostname: builder.example.com\n"
    );

    let result = seed_cmd(&["render", "-p", &profile, "user-data"], &[]);
    let stdout = String::from_utf8(result.stdout).unwrap();
    assert!(stdout.starts_with("#cloud-config\n"));
    assert!(stdout.contains("curl"));

    let result = seed_cmd(&["render", "-p", &profile, "network-config"], &[]);
    assert!(String::from_utf8(result.stdout).unwrap().contains("aa:bb:cc:00:00:01"));
}

#[test]
fn test_manifest_with_layered_profiles() {
    let temp = TempDir::new().unwrap();
    let base = write_profile(temp.path(), "base.yaml", "datasource: ec2\n");
    let overlay = write_profile(
        temp.path(),
        "overlay.yaml",
        "ec2:\n  instance_id: i-0abc\n  availability_zone: us-east-1a\n",
    );

    let result = seed_cmd(&["manifest", "-p", &base, "-p", &overlay], &[]);
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));

    let manifest: serde_json::Value = serde_json::from_slice(&result.stdout).unwrap();
    assert_eq!(manifest["volume_label"], "ec2-seed");
    assert_eq!(manifest["entries"].as_array().unwrap().len(), 2);
}

#[test]
fn test_profile_from_environment() {
    let temp = TempDir::new().unwrap();
    let profile = write_profile(temp.path(), "seed.yaml", PROFILE);

    let result = seed_cmd(&["manifest"], &[("CLOUD_INIT_SEED_PROFILE", profile.as_str())]);
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));
}

#[test]
fn test_inspect_lists_entries() {
    let temp = TempDir::new().unwrap();
    let profile = write_profile(temp.path(), "seed.yaml", PROFILE);
    let output = temp.path().join("seed.iso");
    seed_cmd(&["build", "-p", &profile, "-o", output.to_str().unwrap()], &[]);

    let result = seed_cmd(&["inspect", output.to_str().unwrap()], &[]);
    assert!(result.status.success());
    let stdout = String::from_utf8(result.stdout).unwrap();
    assert!(stdout.starts_with("label: cidata\n"));
    assert!(stdout.contains("network-config"));
}

#[test]
fn test_wrong_provider_section_fails() {
    let temp = TempDir::new().unwrap();
    let profile = write_profile(
        temp.path(),
        "seed.yaml",
        "datasource: nocloud\nconfigdrive:\n  name: x\n",
    );

    let result = seed_cmd(&["manifest", "-p", &profile], &[]);
    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("ConfigDrive"));
}
