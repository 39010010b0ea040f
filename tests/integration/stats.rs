use snappr_core::config::ProtocolKind;
use snappr_core::{NodeId, TimeDelta};
use snappr_nic::ActivityState;

use crate::*;

#[test]
fn test_port_utilization_over_a_single_transfer() {
    let mut config = config(ProtocolKind::DirectPut, 1_000);
    config.stats.epoch_ps = 40_000;
    let mut sim = sim(&config);
    sim.post_recv(NodeId(1), recv_spec(10_000, 0)).unwrap();
    sim.send_at(ps(20_000), send_args(10_000, 0));
    sim.run().unwrap();
    sim.run_until(ps(200_000)).unwrap();

    let report = sim.report();
    let tx = &report.endpoints[0].ports[0];
    assert_eq!(tx.active, TimeDelta::from_ps(100_000));
    assert_eq!(tx.idle, TimeDelta::from_ps(100_000));
    assert_eq!(tx.stalled, TimeDelta::ZERO);
    assert_eq!(tx.bytes_sent, 10_000);
    assert_eq!(tx.packets_sent, 7);

    // 40 ns buckets: idle until 20000, active until 120000.
    assert_eq!(tx.calendar.len(), 5);
    assert_eq!(tx.calendar[0].idle_ps, 20_000);
    assert_eq!(tx.calendar[0].active_ps, 20_000);
    assert_eq!(tx.calendar[2].active_ps, 40_000);
    assert_eq!(tx.calendar[3].active_ps, 0);
    assert_eq!(tx.calendar[3].idle_ps, 40_000);

    let port = sim.endpoint(NodeId(0)).unwrap().nic().port_state(snappr_core::Port(0));
    assert_eq!(port, Some(ActivityState::Idle));
}

#[test]
fn test_report_json_shape() {
    let mut config = config(ProtocolKind::Eager, 1_000);
    config.workload.endpoints = 3;
    let mut sim = sim(&config);
    let workload = snappr_sim::ring(&mut sim, &config.workload).unwrap();
    sim.run().unwrap();
    assert_eq!(workload.incomplete(), 0);

    let json = serde_json::to_value(sim.report()).unwrap();
    assert_eq!(json["pending_events"], 0);
    let endpoints = json["endpoints"].as_array().unwrap();
    assert_eq!(endpoints.len(), 3);
    for ep in endpoints {
        assert_eq!(ep["protocol"], "eager");
        assert_eq!(ep["flows_issued"], 8);
        assert_eq!(ep["receives_finalized"], 8);
        assert_eq!(ep["sends_in_flight"].as_array().unwrap().len(), 0);
        assert_eq!(ep["credit_outstanding"][0], 0);
        assert!(ep["ports"][0]["bytes_sent"].as_u64().unwrap() >= 8 * 65_536);
    }
}
