use crate::helpers::{TestData, example_rows, quick_backends, read_lines, row};
use claims::{assert_err, assert_ok};
use serve_skill::experiment_config::{BackendParams, Experiment};
use serve_skill::summary::{
    ENCODER_FILE, QUALITY_FILE, RUNTIMES_FILE, draws_file_name, make_leaderboard, read_draws,
    read_encoder, write_results,
};

fn fixture() -> TestData {
    let data = TestData::new();
    let mut rows = example_rows();
    rows.push(row("20200203", "B", "C", (58, 30, 9), (61, 33, 8)));
    rows.push(row("20200210", "A", "C", (66, 40, 10), (63, 33, 9)));
    data.write_file("atp_matches_2020.csv", &rows);
    data
}

#[test]
fn run_writes_every_artifact() {
    // Arrange
    let data = fixture();
    let config = data.config(quick_backends());
    let experiment = Experiment::from_config(&config, 2020).unwrap();

    // Act
    let results = assert_ok!(experiment.run());
    assert_ok!(write_results(&experiment.output_dir, &experiment.encoder, &results));

    // Assert
    let dir = data.output_dir().join("2020");
    assert_eq!(experiment.output_dir, dir);
    for label in ["dadvi", "advi", "nuts"] {
        let draws = read_draws(dir.join(draws_file_name(label))).unwrap();
        assert_eq!(draws.posterior["server_skills"][0][0].len(), 3);
    }
    let nuts = read_draws(dir.join(draws_file_name("nuts"))).unwrap();
    assert_eq!((nuts.n_chains, nuts.n_draws), (2, 100));
    assert_eq!(read_encoder(&dir).unwrap(), experiment.encoder);
    assert!(dir.join(ENCODER_FILE).exists());

    let leaderboard = make_leaderboard(&nuts, &experiment.encoder).unwrap();
    assert_eq!(leaderboard.len(), 3);

    let quality = read_lines(dir.join(QUALITY_FILE));
    assert_eq!(quality.len(), 4);
    let fields: Vec<&str> = quality[3].split(',').collect();
    assert_eq!(fields[..2], ["nuts", "nuts"]);
    for value in &fields[2..] {
        assert_eq!(value.parse::<f64>().unwrap(), 0.);
    }
}

#[test]
fn runtimes_follow_run_order() {
    // Arrange
    let data = fixture();
    let config = data.config(quick_backends());
    let experiment = Experiment::from_config(&config, 2020).unwrap();

    // Act
    let results = experiment.run().unwrap();
    write_results(&experiment.output_dir, &experiment.encoder, &results).unwrap();

    // Assert
    let lines = read_lines(data.output_dir().join("2020").join(RUNTIMES_FILE));
    assert_eq!(lines[0], "method,seconds");
    let methods: Vec<&str> = lines[1..]
        .iter()
        .map(|line| line.split(',').next().unwrap())
        .collect();
    assert_eq!(methods, ["dadvi", "advi", "nuts"]);
    for line in &lines[1..] {
        let seconds: f64 = line.split(',').nth(1).unwrap().parse().unwrap();
        assert!(seconds >= 0.);
    }
}

#[test]
fn backends_leave_the_model_untouched() {
    // Arrange
    let data = fixture();
    let experiment = Experiment::from_config(&data.config(quick_backends()), 2020).unwrap();
    let before = experiment.model.clone();

    // Act
    experiment.run().unwrap();

    // Assert
    assert_eq!(experiment.model, before);
}

#[test]
fn seeded_runs_repeat() {
    // Arrange
    let data = fixture();
    let config = data.config(quick_backends());

    // Act
    let first = Experiment::from_config(&config, 2020).unwrap().run().unwrap();
    let second = Experiment::from_config(&config, 2020).unwrap().run().unwrap();

    // Assert
    for (a, b) in first.runs.iter().zip(&second.runs) {
        assert_eq!(a.draws, b.draws, "{} differs between runs", a.label);
    }
}

#[test]
fn no_output_without_input_files() {
    // Arrange
    let data = TestData::new();
    let config = data.config(quick_backends());

    // Act
    let result = Experiment::from_config(&config, 2020);

    // Assert
    assert_err!(result);
    assert!(!data.output_dir().exists());
}

#[test]
fn unknown_method_fails_before_loading() {
    // Arrange
    let data = TestData::new();
    let config = data.config(vec![BackendParams {
        label: "gibbs".into(),
        method: "gibbs".into(),
        params: vec![],
    }]);

    // Act
    let result = Experiment::from_config(&config, 2020);

    // Assert
    let err = assert_err!(result);
    assert!(err.to_string().contains("gibbs"), "{}", err);
}

#[test]
fn failing_backend_aborts_without_output() {
    // Arrange
    let data = fixture();
    let config = data.config(vec![
        BackendParams {
            label: "dadvi".into(),
            method: "dadvi".into(),
            params: vec![10., 100., 100.],
        },
        BackendParams {
            label: "dadvi_empty".into(),
            method: "dadvi".into(),
            params: vec![0.],
        },
    ]);
    let experiment = assert_ok!(Experiment::from_config(&config, 2020));

    // Act
    let result = experiment.run();

    // Assert
    assert_err!(result);
    assert!(!data.output_dir().exists());
}
