use ndarray::array;
use rebyval::{
    StudentId, SupervisorId,
    config::{StudentConfig, SupervisorConfig},
    data::Batch,
    samples::{MemorySampleStore, Sample, SampleMeta, SampleWriter, Tensor},
    trace::{MemoryTrace, NullTrace},
    training::{Student, Supervisor},
};
use serde_json::json;

const WEIGHTS: usize = 17;

fn supervisor_config() -> SupervisorConfig {
    serde_json::from_value(json!({
        "dataloader": { "batch_size": 4, "epochs": 5, "valid_fraction": 0.2 },
        "model": { "hidden": [6], "act_fn": "tanh" },
        "optimizer": { "adam": { "learning_rate": 0.01 } },
        "train_loop": { "valid": { "valid_gap": 2 } }
    }))
    .unwrap()
}

fn student_config() -> StudentConfig {
    serde_json::from_value(json!({
        "dataloader": {
            "dataset": { "synthetic": {
                "features": 2, "classes": 2,
                "train_size": 8, "valid_size": 8, "test_size": 8
            } },
            "batch_size": 4, "epochs": 1,
            "train_step": 2, "valid_step": 1, "test_step": 1
        },
        "model": { "hidden": [3], "act_fn": "tanh" },
        "train_loop": { "valid": { "valid_gap": 1 } }
    }))
    .unwrap()
}

/// A pool where the loss grows with the mean weight.
fn pool(students: u64) -> MemorySampleStore {
    let mut store = MemorySampleStore::new();

    for id in 0..students {
        for step in 0..4 {
            let base = (id * 4 + step) as f32 / 20.0;
            let values: Vec<f32> = (0..WEIGHTS).map(|j| base - j as f32 / 40.0).collect();
            let mean = values.iter().sum::<f32>() / WEIGHTS as f32;

            let sample = Sample {
                weights: vec![Tensor {
                    name: "flat".into(),
                    shape: vec![WEIGHTS],
                    values,
                }],
                valid_loss: 0.5 + mean,
                meta: SampleMeta {
                    student_id: StudentId(id),
                    epoch: 0,
                    step: step as usize,
                    supervised: false,
                },
            };
            store.append(&sample).unwrap();
        }
    }

    store
}

#[test]
fn resetting_runs_are_reproducible() {
    let store = pool(3);

    let mut a = Supervisor::new(SupervisorId(0), supervisor_config(), WEIGHTS, 9).unwrap();
    a.run(false, &[], &store, &mut NullTrace).unwrap();
    let first = a.params().to_vec();

    // a continued run moves away, a reset brings the same trajectory back
    a.run(true, &[], &store, &mut NullTrace).unwrap();
    assert_ne!(a.params(), first.as_slice());

    let mut trace = MemoryTrace::new();
    a.run(false, &[], &store, &mut trace).unwrap();
    assert_eq!(a.params(), first.as_slice());

    let mut b = Supervisor::new(SupervisorId(1), supervisor_config(), WEIGHTS, 9).unwrap();
    let mut other_trace = MemoryTrace::new();
    b.run(false, &[], &store, &mut other_trace).unwrap();

    assert_eq!(b.params(), first.as_slice());
    assert_eq!(
        trace.values("supervisor-0/train_loss"),
        other_trace.values("supervisor-1/train_loss")
    );
}

#[test]
fn continued_runs_build_on_previous_parameters() {
    let store = pool(3);

    let fresh = Supervisor::new(SupervisorId(0), supervisor_config(), WEIGHTS, 2).unwrap();
    let initial = fresh.params().to_vec();

    let mut a = Supervisor::new(SupervisorId(0), supervisor_config(), WEIGHTS, 2).unwrap();
    a.run(false, &[], &store, &mut NullTrace).unwrap();
    let after_first = a.params().to_vec();
    assert_ne!(after_first, initial);

    a.run(true, &[], &store, &mut NullTrace).unwrap();
    let continued = a.params().to_vec();
    assert_ne!(continued, initial);
    assert_ne!(continued, after_first);

    // the same call sequence lands on the same parameters
    let mut b = Supervisor::new(SupervisorId(0), supervisor_config(), WEIGHTS, 2).unwrap();
    b.run(false, &[], &store, &mut NullTrace).unwrap();
    b.run(true, &[], &store, &mut NullTrace).unwrap();
    assert_eq!(b.params(), continued.as_slice());

    // while restarting twice doesn't
    let mut c = Supervisor::new(SupervisorId(0), supervisor_config(), WEIGHTS, 2).unwrap();
    c.run(false, &[], &store, &mut NullTrace).unwrap();
    c.run(false, &[], &store, &mut NullTrace).unwrap();
    assert_eq!(c.params(), after_first.as_slice());
    assert_ne!(c.params(), continued.as_slice());
}

#[test]
fn critic_changes_the_student_gradient() {
    let store = pool(2);
    let mut supervisor = Supervisor::new(SupervisorId(0), supervisor_config(), WEIGHTS, 4).unwrap();
    supervisor.run(false, &[], &store, &mut NullTrace).unwrap();

    let cfg = student_config();
    let batch = Batch {
        x: array![[0.5, -1.0], [1.5, 0.25]],
        y: array![[1.0, 0.0], [0.0, 1.0]],
    };

    let mut plain_store = MemorySampleStore::new();
    let mut plain = Student::new(StudentId(0), &cfg, (2, 2), None, &mut plain_store, 11).unwrap();
    plain.compute_gradient(&batch).unwrap();

    let mut supervised_store = MemorySampleStore::new();
    let critic = supervisor.critic().unwrap();
    let mut supervised = Student::new(
        StudentId(1),
        &cfg,
        (2, 2),
        Some(critic.clone()),
        &mut supervised_store,
        11,
    )
    .unwrap();
    let loss = supervised.compute_gradient(&batch).unwrap();

    let mut critic = critic;
    let mut critic_grad = vec![0.0; WEIGHTS];
    let surrogate = critic
        .surrogate(supervised.params(), &mut critic_grad)
        .unwrap();

    assert_eq!(loss.surrogate, Some(surrogate));
    assert!(critic_grad.iter().any(|g| *g != 0.0));
    assert_ne!(plain.gradient(), supervised.gradient());

    for ((p, s), c) in plain
        .gradient()
        .iter()
        .zip(supervised.gradient())
        .zip(&critic_grad)
    {
        assert!((s - p - c).abs() < 1e-5);
    }

    // the critic is a frozen copy
    assert_eq!(critic.params(), supervisor.params());
}
