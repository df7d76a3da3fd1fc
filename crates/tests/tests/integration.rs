//! End-to-end report recording through the public registry surface.

use voltrace_runtime::ReportKind;
use voltrace_storage::DatasetValues;
use voltrace_tests::{SharedValue, TestHarness};

const DT: f64 = 0.1;
const TSTART: f64 = 0.0;
const TEND: f64 = 0.3;

/// One soma node whose element reads back `value`.
fn soma_setup(harness: &mut TestHarness, report: &str) -> SharedValue {
    let value = SharedValue::new(0.0);
    harness
        .registry
        .create_report(report, ReportKind::Soma, TSTART, TEND, DT, "mV");
    harness.registry.add_node(report, "All", 0, 1).unwrap();
    harness
        .registry
        .add_element(report, "All", 1, 0, value.value_fn())
        .unwrap();
    value
}

#[test]
fn test_single_worker_soma_report() {
    let mut harness = TestHarness::new();
    let value = soma_setup(&mut harness, "soma_report");
    harness.registry.set_atomic_step(DT);

    assert_eq!(harness.registry.setup_coordinators().unwrap(), 0);
    harness.registry.prepare_datasets().unwrap();

    let mut t = 0.0;
    for step in 0..3 {
        value.set(step as f64);
        harness
            .registry
            .record_node_data(step as f64, &[1], "soma_report");
        harness.registry.check_and_flush(t).unwrap();
        t += DT;
    }
    harness.registry.flush(t).unwrap();

    let container = harness.container("soma_report");
    let container = container.lock().unwrap();

    let data = container.data_2d("/report/All/data").unwrap();
    assert_eq!(data.rows, 3);
    assert_eq!(data.cols, 1);
    assert_eq!(data.values, vec![0.0, 1.0, 2.0]);
    assert_eq!(container.attribute("/report/All/data", "units"), Some("mV"));

    // default one-based ids: node 1 at offset 0 lands at 0
    assert_eq!(
        container.dataset("/report/All/mapping/node_ids"),
        Some(&DatasetValues::U64(vec![0]))
    );
    // single worker is the elected last rank
    assert_eq!(
        container.dataset("/report/All/mapping/index_pointers"),
        Some(&DatasetValues::U64(vec![0, 1]))
    );
    assert_eq!(
        container.dataset("/report/All/mapping/element_ids"),
        Some(&DatasetValues::U32(vec![0]))
    );
    assert_eq!(
        container.time("/report/All/mapping/time"),
        Some([0.0, 0.3, 0.1])
    );
    assert_eq!(
        container.attribute("/report/All/mapping/time", "units"),
        Some("ms")
    );
    assert!(container.is_closed());
}

#[test]
fn test_small_buffer_forces_mid_run_flush() {
    let mut harness = TestHarness::new();
    let value = soma_setup(&mut harness, "soma_report");
    // 8 bytes hold two f32 samples: flushes of 2 and 1 rows
    harness.registry.set_max_buffer_size(8);
    harness.registry.set_atomic_step(DT);

    harness.registry.setup_coordinators().unwrap();
    harness.registry.prepare_datasets().unwrap();

    let mut t = 0.0;
    for step in 0..3 {
        value.set(step as f64);
        harness
            .registry
            .record_node_data(step as f64, &[1], "soma_report");
        harness.registry.check_and_flush(t).unwrap();
        t += DT;
    }
    harness.registry.flush(t).unwrap();

    let container = harness.container("soma_report");
    let container = container.lock().unwrap();
    let data = container.data_2d("/report/All/data").unwrap();
    assert_eq!(data.appends, vec![2, 1]);
    assert_eq!(data.values, vec![0.0, 1.0, 2.0]);
}

#[test]
fn test_selective_record_advances_with_complete_steps() {
    let mut harness = TestHarness::new();
    harness
        .registry
        .create_report("selective", ReportKind::Soma, TSTART, 0.4, DT, "mV");
    for node_id in [1u64, 2, 3] {
        harness.registry.add_node("selective", "All", 0, node_id).unwrap();
        let value = SharedValue::new(node_id as f64);
        harness
            .registry
            .add_element("selective", "All", node_id, 0, value.value_fn())
            .unwrap();
    }
    harness.registry.set_atomic_step(DT);
    harness.registry.setup_coordinators().unwrap();
    harness.registry.prepare_datasets().unwrap();

    harness.registry.record_node_data(0.0, &[1, 3], "selective");
    harness.registry.check_and_flush(0.0).unwrap();
    {
        let report = harness.registry.get_report("selective").unwrap();
        assert_eq!(report.buffers()[0].current_step(), 0);
    }

    harness.registry.record_node_data(0.0, &[1, 2, 3], "selective");
    harness.registry.check_and_flush(0.1).unwrap();
    let report = harness.registry.get_report("selective").unwrap();
    assert_eq!(report.buffers()[0].current_step(), 1);
}

#[test]
fn test_reporting_period_skips_intermediate_ticks() {
    let mut harness = TestHarness::new();
    let value = soma_setup(&mut harness, "strided");
    // dt spans four atomic ticks: samples land on ticks 0, 4, 8
    harness.registry.set_atomic_step(DT / 4.0);

    harness.registry.setup_coordinators().unwrap();
    harness.registry.prepare_datasets().unwrap();

    for tick in 0..12 {
        value.set(tick as f64);
        harness.registry.record_data(tick as f64).unwrap();
    }
    harness.registry.flush(TEND).unwrap();

    let container = harness.container("strided");
    let container = container.lock().unwrap();
    let data = container.data_2d("/report/All/data").unwrap();
    assert_eq!(data.rows, 3);
    assert_eq!(data.values, vec![0.0, 4.0, 8.0]);
}

#[test]
fn test_flush_is_idempotent_after_drain() {
    let mut harness = TestHarness::new();
    let value = soma_setup(&mut harness, "soma_report");
    harness.registry.set_atomic_step(DT);
    harness.registry.setup_coordinators().unwrap();
    harness.registry.prepare_datasets().unwrap();

    for step in 0..3 {
        value.set(step as f64);
        harness.registry.record_data(step as f64).unwrap();
    }
    harness.registry.flush(TEND).unwrap();
    harness.registry.flush(TEND + DT).unwrap();
    harness.registry.flush(TEND + 2.0 * DT).unwrap();

    let container = harness.container("soma_report");
    let container = container.lock().unwrap();
    let data = container.data_2d("/report/All/data").unwrap();
    assert_eq!(data.rows, 3);
    assert_eq!(data.appends, vec![3]);
}

#[test]
fn test_record_before_prepare_is_a_no_op() {
    let mut harness = TestHarness::new();
    let _value = soma_setup(&mut harness, "soma_report");
    harness.registry.record_node_data(0.0, &[1], "soma_report");
    harness.registry.record_data(0.0).unwrap();
}

#[test]
fn test_refresh_pointers_swaps_value_sources() {
    let mut harness = TestHarness::new();
    let stale = soma_setup(&mut harness, "soma_report");
    stale.set(-1.0);
    harness.registry.set_atomic_step(DT);
    harness.registry.setup_coordinators().unwrap();
    harness.registry.prepare_datasets().unwrap();

    // the simulator reallocated: every element moves to a fresh source
    let fresh = SharedValue::new(42.0);
    let replacement = fresh.clone();
    harness
        .registry
        .refresh_pointers(&move |_node_id, _element_id| Some(replacement.value_fn()));

    for step in 0..3 {
        harness.registry.record_data(step as f64).unwrap();
    }
    harness.registry.flush(TEND).unwrap();

    let container = harness.container("soma_report");
    let container = container.lock().unwrap();
    let data = container.data_2d("/report/All/data").unwrap();
    assert_eq!(data.values, vec![42.0, 42.0, 42.0]);
}

#[test]
fn test_complete_run_writes_every_step() {
    let mut harness = TestHarness::new();
    let value = soma_setup(&mut harness, "soma_report");
    harness.registry.set_atomic_step(DT);
    harness.registry.setup_coordinators().unwrap();
    harness.registry.prepare_datasets().unwrap();

    let num_steps = harness.registry.get_report("soma_report").unwrap().num_steps();
    for step in 0..num_steps {
        value.set(step as f64);
        harness.registry.record_data(step as f64).unwrap();
    }
    harness.registry.flush(TEND).unwrap();

    let container = harness.container("soma_report");
    let container = container.lock().unwrap();
    let data = container.data_2d("/report/All/data").unwrap();
    assert_eq!(data.values.len() as u64, u64::from(num_steps) * data.cols);
    assert_eq!(data.rows, num_steps);
}
