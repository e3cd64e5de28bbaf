//! Integration tests for NoCloud seed images using tempfile

use std::fs;
use tempfile::TempDir;

use cloud_init_seed::config::CloudConfig;
use cloud_init_seed::image::{assemble_image, read_image};
use cloud_init_seed::{SeedConfig, User};

fn nocloud() -> SeedConfig {
    let mut config = SeedConfig::new_nocloud().unwrap();
    config.set_password_cost(4);
    config
}

/// User, interface and image end to end
#[test]
fn test_nocloud_image_with_user_and_interface() {
    let mut config = nocloud();
    config.set_fqdn("host.domain.tld");
    config
        .add_user(User::new("ops").with_password("pw1"))
        .unwrap();
    config.set_static_interface("aa:bb:cc:dd:ee:ff", "10.0.0.5/24", "10.0.0.1", &["8.8.8.8"]);

    let temp_dir = TempDir::new().unwrap();
    let iso_path = temp_dir.path().join("seed.iso");
    let mut file = fs::File::create(&iso_path).unwrap();
    assemble_image(&config, &mut file).unwrap();
    drop(file);

    let image = read_image(&fs::read(&iso_path).unwrap()).unwrap();
    assert_eq!(image.label(), "cidata");
    assert_eq!(image.volume_label, "cidata");

    let mut paths = image.paths();
    paths.sort();
    assert_eq!(paths, vec!["meta-data", "network-config", "user-data"]);

    let meta = String::from_utf8(image.get("meta-data").unwrap().content.clone()).unwrap();
    assert_eq!(meta, "instance-id: host\nlocal-hostname: host.domain.tld\n");

    let user_data =
        String::from_utf8(image.get("user-data").unwrap().content.clone()).unwrap();
    assert!(user_data.starts_with("#cloud-config\n"));
    let cloud = CloudConfig::from_yaml(&user_data).unwrap();
    assert_eq!(cloud.users.len(), 1);
    assert_eq!(cloud.users[0].name, "ops");
    assert!(bcrypt::verify("pw1", &cloud.users[0].passwd).unwrap());

    let network: serde_yaml::Value =
        serde_yaml::from_slice(&image.get("network-config").unwrap().content).unwrap();
    let iface = &network["network"]["config"][0];
    assert_eq!(network["network"]["version"], 1);
    assert_eq!(iface["name"], "interface0");
    assert_eq!(iface["mac_address"], "aa:bb:cc:dd:ee:ff");
    assert_eq!(iface["subnets"][0]["address"], "10.0.0.5/24");
    assert_eq!(iface["subnets"][0]["dns_nameservers"][0], "8.8.8.8");
}

/// Without interfaces the image has no network document
#[test]
fn test_nocloud_image_without_interfaces() {
    let config = nocloud();
    let image = read_image(&cloud_init_seed::image::assemble_image_to_vec(&config).unwrap()).unwrap();

    let mut paths = image.paths();
    paths.sort();
    assert_eq!(paths, vec!["meta-data", "user-data"]);
}

/// Guest agent and system settings reach the user-data in the image
#[test]
fn test_nocloud_user_data_contents() {
    let mut config = nocloud();
    config.set_root_password("rootpassword");
    config.enable_guest_agent();
    config.enable_guest_agent();
    config.add_run_command("touch /etc/provisioned");
    config.configure_storage(&["/"]);
    config.add_file("/etc/motd", "welcome\n", "0644");

    let image = read_image(&cloud_init_seed::image::assemble_image_to_vec(&config).unwrap()).unwrap();
    let user_data =
        String::from_utf8(image.get("user-data").unwrap().content.clone()).unwrap();
    let cloud = CloudConfig::from_yaml(&user_data).unwrap();

    assert_eq!(cloud.packages, vec!["qemu-guest-agent"]);
    assert_eq!(
        cloud.runcmd,
        vec!["touch /etc/provisioned", "systemctl enable qemu-guest-agent --now"]
    );
    assert_eq!(cloud.chpasswd.unwrap().list, vec!["root:rootpassword"]);
    assert_eq!(cloud.growpart.unwrap().devices, vec!["/"]);
    assert_eq!(cloud.write_files[0].path, "/etc/motd");
    assert_eq!(cloud.write_files[0].content, "welcome\n");
}

/// Several interfaces are named in MAC order
#[test]
fn test_nocloud_interfaces_sorted_by_mac() {
    let mut config = nocloud();
    config.set_static_interface("52:54:00:00:00:02", "10.0.1.5/24", "10.0.1.1", &[]);
    config.set_static_interface("52:54:00:00:00:01", "10.0.0.5/24", "10.0.0.1", &[]);

    let image = read_image(&cloud_init_seed::image::assemble_image_to_vec(&config).unwrap()).unwrap();
    let network: serde_yaml::Value =
        serde_yaml::from_slice(&image.get("network-config").unwrap().content).unwrap();
    let entries = network["network"]["config"].as_sequence().unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["mac_address"], "52:54:00:00:00:01");
    assert_eq!(entries[0]["name"], "interface0");
    assert_eq!(entries[1]["mac_address"], "52:54:00:00:00:02");
    assert!(entries[0]["subnets"][0].get("dns_nameservers").is_none());
}
