// ============================================================================
// File: os-faults/tests/scenarios.rs
// ----------------------------------------------------------------------------
// End-to-end scenarios through the public API with recording collaborators.
// ============================================================================

mod common;

use std::sync::Arc;

use serde_json::json;

use os_faults::executor::{Payload, Status, Task};
use os_faults::{Host, OsFaultsError};

use common::{FakeBmc, FakeConnector, FakeExecutor, FakeHypervisor, config};

#[tokio::test]
async fn verify_runs_hostname_on_universal_address() {
    let executor = FakeExecutor::new(|_: &str, _: &Task| (Status::Ok, Payload::stdout("openstack.local")));
    let cloud = os_faults::connect_with(
        &config(json!({"cloud_management": {"driver": "universal", "args": {"address": "10.0.0.10"}}})),
        &executor.context(),
    )
    .expect("connected");

    cloud.verify().await.expect("cloud is reachable");

    assert_eq!(
        executor.calls(),
        vec![(vec!["10.0.0.10".to_string()], Task::command("hostname"))]
    );
}

#[tokio::test]
async fn pick_from_node_list() {
    let executor = FakeExecutor::ok();
    let cloud = os_faults::connect_with(
        &config(json!({
            "cloud_management": {"driver": "universal"},
            "node_discover": {"driver": "node_list", "args": [
                {"ip": "10.0.0.51"}, {"ip": "10.0.0.52"}, {"ip": "10.0.0.53"}
            ]}
        })),
        &executor.context(),
    )
    .expect("connected");

    let nodes = cloud.get_nodes(None).await.expect("listed");
    let picked = nodes.pick(2).expect("two of three");

    assert_eq!(picked.len(), 2);
    assert!(picked.iter().all(|host| nodes.contains(host)));
    assert!(nodes.pick(4).is_err());
}

#[tokio::test]
async fn kill_targets_only_hosts_running_the_process() {
    let executor = FakeExecutor::new(|host: &str, task: &Task| match task {
        Task::Shell(script) if script.starts_with("ps ax") && host != "10.0.0.3" => {
            (Status::Failed, Payload::default())
        }
        _ => (Status::Ok, Payload::default()),
    });
    let cloud = os_faults::connect_with(
        &config(json!({
            "cloud_management": {"driver": "universal"},
            "node_discover": {"driver": "node_list", "args": [{"ip": "10.0.0.2"}, {"ip": "10.0.0.3"}]},
            "services": {"keystone": {"driver": "process", "args": {"grep": "keystone"}}}
        })),
        &executor.context(),
    )
    .expect("connected");

    cloud
        .get_service("keystone")
        .expect("configured")
        .kill(None)
        .await
        .expect("killed");

    let kills: Vec<_> = executor
        .calls()
        .into_iter()
        .filter(|(_, task)| matches!(task, Task::Kill(_)))
        .collect();
    assert_eq!(
        kills,
        vec![(vec!["10.0.0.3".to_string()], Task::kill("keystone", 9))]
    );
}

#[tokio::test]
async fn unclaimed_host_fails_power_off() {
    let hypervisor = Arc::new(FakeHypervisor {
        domains: vec![os_faults::drivers::power::Domain {
            name: "vm1".to_string(),
            xml: "<mac address='aa:00:00:00:00:01'/>".to_string(),
        }],
        ..FakeHypervisor::default()
    });
    let bmc = Arc::new(FakeBmc::default());
    let ctx = FakeExecutor::ok()
        .context()
        .with_hypervisors(Arc::new(FakeConnector(hypervisor.clone())))
        .with_bmc(bmc.clone());
    let cloud = os_faults::connect_with(
        &config(json!({
            "cloud_management": {"driver": "universal"},
            "power_managements": [
                {"driver": "libvirt", "args": {"connection_uri": "qemu:///system"}},
                {"driver": "ipmi", "args": {"mac_to_bmc": {
                    "cc:00:00:00:00:03": {"address": "10.0.0.103", "username": "admin", "password": "secret"}
                }}}
            ]
        })),
        &ctx,
    )
    .expect("connected");

    let h1 = Host::new("10.0.0.1").with_mac("aa:00:00:00:00:01").with_libvirt_name("vm1");
    let h2 = Host::new("10.0.0.2").with_mac("bb:00:00:00:00:02");
    let err = cloud
        .power_manager()
        .poweroff(&[h1.clone(), h2])
        .await
        .unwrap_err();

    assert!(matches!(err, OsFaultsError::PowerManagement { .. }));
    assert!(err.to_string().contains("bb:00:00:00:00:02"));
    assert!(bmc.requests.lock().expect("requests lock").is_empty());

    cloud.power_manager().poweroff(&[h1]).await.expect("libvirt owns vm1");
    assert_eq!(hypervisor.actions(), vec!["destroy vm1"]);
}

#[tokio::test]
async fn human_restart_without_nodes_uses_discovery() {
    let executor = FakeExecutor::new(|_: &str, _: &Task| (Status::Ok, Payload::default()));
    let cloud = os_faults::connect_with(
        &config(json!({
            "cloud_management": {"driver": "universal"},
            "node_discover": {"driver": "node_list", "args": [{"ip": "10.0.0.2"}]},
            "services": {"keystone": {"driver": "linux_service", "args": {"linux_service": "apache2"}}}
        })),
        &executor.context(),
    )
    .expect("connected");

    os_faults::human_api(&cloud, "Restart keystone service")
        .await
        .expect("restarted");

    let restarts: Vec<_> = executor
        .calls()
        .into_iter()
        .filter(|(_, task)| task == &Task::shell("service 'apache2' restart"))
        .collect();
    assert_eq!(restarts.len(), 1);
    assert_eq!(restarts[0].0, vec!["10.0.0.2"]);
}

#[tokio::test]
async fn human_reboot_by_fqdn() {
    let executor = FakeExecutor::ok();
    let cloud = os_faults::connect_with(
        &config(json!({
            "cloud_management": {"driver": "universal"},
            "node_discover": {"driver": "node_list", "args": [
                {"ip": "10.0.0.1", "fqdn": "node-1.local"},
                {"ip": "10.0.0.2", "fqdn": "node-2.local"}
            ]}
        })),
        &executor.context(),
    )
    .expect("connected");

    os_faults::human_api(&cloud, "Reboot node-2.local node")
        .await
        .expect("rebooted");

    assert_eq!(
        executor.calls(),
        vec![(vec!["10.0.0.2".to_string()], Task::command("reboot now"))]
    );
}

#[tokio::test]
async fn unknown_fqdn_is_an_error() {
    let cloud = os_faults::connect_with(
        &config(json!({
            "cloud_management": {"driver": "universal"},
            "node_discover": {"driver": "node_list", "args": [{"ip": "10.0.0.1", "fqdn": "node-1.local"}]}
        })),
        &FakeExecutor::ok().context(),
    )
    .expect("connected");

    let err = cloud
        .get_nodes(Some(&["node-9.local".to_string()]))
        .await
        .unwrap_err();
    assert!(matches!(err, OsFaultsError::NodeCollection { .. }));
}

#[tokio::test]
async fn unparseable_command_is_rejected() {
    let cloud = os_faults::connect_with(
        &config(json!({"cloud_management": {"driver": "universal", "args": {"address": "10.0.0.10"}}})),
        &FakeExecutor::ok().context(),
    )
    .expect("connected");

    let err = os_faults::human_api(&cloud, "make everything faster")
        .await
        .unwrap_err();
    assert!(matches!(err, OsFaultsError::Parse { .. }));
}
