use crate::helpers::{Row, TestData, example_rows, row};
use claims::{assert_err, assert_ok};
use serve_skill::Error;
use serve_skill::data_processing::{FilterParams, derive_serve_matches, load_matches};
use serve_skill::encoder::PlayerEncoder;
use serve_skill::experiment_config::Experiment;
use serve_skill::model::Observations;

#[test]
fn example_matches_produce_four_observations() {
    // Arrange
    let data = TestData::new();
    data.write_file("atp_matches_2020.csv", &example_rows());
    let config = data.config(crate::helpers::quick_backends());

    // Act
    let experiment = assert_ok!(Experiment::from_config(&config, 2019));

    // Assert
    assert_eq!(experiment.encoder.len(), 3);
    assert_eq!(experiment.encoder.classes(), ["A", "B", "C"]);
    let obs = experiment.model.observations();
    assert_eq!(obs.len(), 4);
    assert_eq!(obs.points_total, vec![60, 55, 50, 40]);
    assert_eq!(obs.points_won, vec![40, 30, 20, 15]);
    assert_eq!(experiment.model.dim(), 9);
}

#[test]
fn filtered_matches_satisfy_invariants() {
    // Arrange
    let data = TestData::new();
    let mut rows = example_rows();
    rows.push(row("20170301", "D", "E", (70, 40, 12), (66, 35, 10)));
    rows.push(Row {
        level: "D",
        ..row("20210915", "F", "A", (80, 50, 10), (75, 40, 12))
    });
    rows.push(Row {
        l: None,
        ..row("20210920", "G", "B", (61, 40, 9), (58, 30, 8))
    });
    data.write_file("atp_matches_2021.csv", &rows);
    let params = FilterParams {
        start_year: 2018,
        exclude_tourney_level: Some("D".into()),
    };

    // Act
    let records = load_matches(data.data_dir(), false).unwrap();
    let matches = derive_serve_matches(&records, &params).unwrap();

    // Assert
    assert_eq!(records.len(), 5);
    assert_eq!(matches.len(), 2);
    for m in &matches {
        assert_eq!(m.winner.svpt_won, m.winner.first_won + m.winner.second_won);
        assert_eq!(m.loser.svpt_won, m.loser.first_won + m.loser.second_won);
        assert!(m.date.format("%Y").to_string().parse::<i32>().unwrap() >= 2018);
        assert_ne!(m.tourney_level, "D");
    }
    assert!(matches.windows(2).all(|w| w[0].date <= w[1].date));
}

#[test]
fn encoder_covers_every_player_and_round_trips() {
    // Arrange
    let data = TestData::new();
    let mut rows = example_rows();
    rows.push(row("20200120", "Zed", "B", (50, 30, 6), (52, 28, 7)));
    data.write_file("atp_matches_2020.csv", &rows);
    let matches = derive_serve_matches(
        &load_matches(data.data_dir(), false).unwrap(),
        &FilterParams::from_year(2020),
    )
    .unwrap();

    // Act
    let encoder = PlayerEncoder::fit(
        matches
            .iter()
            .flat_map(|m| [m.winner_name.clone(), m.loser_name.clone()]),
    );

    // Assert
    assert_eq!(encoder.len(), 4);
    for id in 0..encoder.len() {
        let name = encoder.inverse_transform(id).unwrap();
        assert_eq!(encoder.transform(name).unwrap(), id);
    }
    let obs = Observations::from_matches(&matches, &encoder).unwrap();
    assert_eq!(obs.len(), 2 * matches.len());
    let n = matches.len();
    for i in 0..n {
        assert_eq!(obs.server_ids[i], obs.returner_ids[i + n]);
        assert_eq!(obs.returner_ids[i], obs.server_ids[i + n]);
    }
}

#[test]
fn pipeline_is_deterministic() {
    // Arrange
    let data = TestData::new();
    data.write_file("atp_matches_2019.csv", &[row("20190107", "Q", "P", (64, 35, 11), (70, 38, 9))]);
    data.write_file("atp_matches_2020.csv", &example_rows());
    let config = data.config(crate::helpers::quick_backends());

    // Act
    let first = Experiment::from_config(&config, 2019).unwrap();
    let second = Experiment::from_config(&config, 2019).unwrap();

    // Assert
    assert_eq!(first.encoder, second.encoder);
    assert_eq!(first.model, second.model);
    assert_eq!(first.model.observations().len(), 6);
}

#[test]
fn challenger_files_are_opt_in() {
    // Arrange
    let data = TestData::new();
    data.write_file("atp_matches_2020.csv", &example_rows());
    data.write_file(
        "atp_matches_qual_chall_2020.csv",
        &[row("20200210", "X", "Y", (60, 30, 10), (62, 31, 9))],
    );

    // Act
    let tour_only = load_matches(data.data_dir(), false).unwrap();
    let with_challengers = load_matches(data.data_dir(), true).unwrap();

    // Assert
    assert_eq!(tour_only.len(), 2);
    assert_eq!(with_challengers.len(), 3);
    assert_eq!(with_challengers[2].winner_name, "X");
}

#[test]
fn missing_data_is_reported() {
    // Arrange
    let data = TestData::new();
    data.write_file("wta_matches_2020.csv", &example_rows());

    // Act
    let result = load_matches(data.data_dir(), true);

    // Assert
    assert!(matches!(assert_err!(result), Error::DataNotFound { .. }));
}
