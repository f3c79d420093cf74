use once_cell::sync::Lazy;
use serve_skill::experiment_config::{BackendParams, ExperimentConfig};
use serve_skill::telemetry::{get_subscriber, init_subscriber};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// Ensure that the `tracing` stack is only initialised once using `once_cell`
static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = "info";
    if std::env::var("TEST_LOG").is_ok() {
        init_subscriber(get_subscriber(default_filter_level, std::io::stdout))
            .expect("Failed to set subscriber");
    } else {
        init_subscriber(get_subscriber(default_filter_level, std::io::sink))
            .expect("Failed to set subscriber");
    }
});

const HEADER: &str = "tourney_id,tourney_name,surface,tourney_level,tourney_date,\
                      winner_name,loser_name,w_svpt,w_1stWon,w_2ndWon,l_svpt,l_1stWon,l_2ndWon";

/// One CSV row. Counts are (svpt, 1stWon, 2ndWon); `None` leaves the fields empty.
pub struct Row<'a> {
    pub level: &'a str,
    pub date: &'a str,
    pub winner: &'a str,
    pub loser: &'a str,
    pub w: Option<(u32, u32, u32)>,
    pub l: Option<(u32, u32, u32)>,
}

impl Row<'_> {
    fn to_csv(&self) -> String {
        let counts = |side: Option<(u32, u32, u32)>| match side {
            Some((svpt, first, second)) => format!("{},{},{}", svpt, first, second),
            None => ",,".to_string(),
        };
        format!(
            "{}-1,Test Open,Hard,{},{},{},{},{},{}",
            &self.date[..4],
            self.level,
            self.date,
            self.winner,
            self.loser,
            counts(self.w),
            counts(self.l)
        )
    }
}

pub fn row<'a>(date: &'a str, winner: &'a str, loser: &'a str, w: (u32, u32, u32), l: (u32, u32, u32)) -> Row<'a> {
    Row {
        level: "A",
        date,
        winner,
        loser,
        w: Some(w),
        l: Some(l),
    }
}

/// The two-match example: A beats B (40/60 against 20/50), C beats A (30/55 against 15/40).
pub fn example_rows() -> Vec<Row<'static>> {
    vec![
        row("20200106", "A", "B", (60, 30, 10), (50, 15, 5)),
        row("20200113", "C", "A", (55, 22, 8), (40, 10, 5)),
    ]
}

pub struct TestData {
    pub root: TempDir,
}

impl TestData {
    pub fn new() -> Self {
        Lazy::force(&TRACING);
        Self {
            root: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.path().join("tennis_atp")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.path().join("fit_results")
    }

    pub fn write_file(&self, file_name: &str, rows: &[Row]) -> PathBuf {
        std::fs::create_dir_all(self.data_dir()).expect("Failed to create data dir");
        let mut contents = String::from(HEADER);
        for row in rows {
            contents.push('\n');
            contents.push_str(&row.to_csv());
        }
        contents.push('\n');
        let path = self.data_dir().join(file_name);
        std::fs::write(&path, contents).expect("Failed to write match file");
        path
    }

    /// A configuration with short backend runs reading from this fixture.
    pub fn config(&self, backends: Vec<BackendParams>) -> ExperimentConfig {
        ExperimentConfig {
            tennis_atp_dir: self.data_dir(),
            output_dir: self.output_dir(),
            seed: 11,
            backends,
            ..ExperimentConfig::v1()
        }
    }
}

pub fn quick_backends() -> Vec<BackendParams> {
    let backend = |label: &str, method: &str, params: &[f64]| BackendParams {
        label: label.into(),
        method: method.into(),
        params: params.to_vec(),
    };
    vec![
        backend("dadvi", "dadvi", &[10., 100., 100.]),
        backend("advi", "advi", &[500., 100.]),
        backend("nuts", "nuts", &[100., 100., 2.]),
    ]
}

pub fn read_lines(path: impl AsRef<Path>) -> Vec<String> {
    std::fs::read_to_string(path)
        .expect("Failed to read output")
        .lines()
        .map(str::to_string)
        .collect()
}
