//! Test helpers shared by unit tests, integration tests and benches.

use std::sync::OnceLock;

use rand::prelude::*;

use crate::pipeline::{ClassificationPipeline, PipelineConfig, SamplingParams, TreeParams};
use crate::table::{Column, ColumnData, TabularTable};

pub use crate::jobs::features::{MULTISIM_FEATURES, MULTISIM_TARGET as TARGET};

/// Text-valued columns of the multi-SIM dataset.
pub const MULTISIM_CATEGORICAL: [&str; 6] = ["trf", "gndr", "dev_man", "device_os_name", "simcard_type", "region"];

const TARIFFS: [&str; 4] = ["basic", "smart", "unlimited", "family"];
const MANUFACTURERS: [&str; 5] = ["samsung", "apple", "xiaomi", "huawei", "nokia"];
const OS_NAMES: [&str; 3] = ["android", "ios", "other"];
const SIM_TYPES: [&str; 2] = ["nano", "micro"];
const REGIONS: [&str; 5] = ["north", "south", "east", "west", "capital"];

fn pick<'a>(rng: &mut StdRng, values: &[&'a str]) -> &'a str {
    values[rng.gen_range(0..values.len())]
}

/// Deterministic multi-SIM-shaped table with a learnable binary target.
///
/// The target is mostly driven by `age`, `is_dualsim` and `region`; about
/// 5% of values are missing in `age` and `region`.
pub fn synthetic_multisim(n_rows: usize, seed: u64) -> TabularTable {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut text: Vec<Vec<Option<String>>> = vec![Vec::with_capacity(n_rows); MULTISIM_CATEGORICAL.len()];
    let mut age = Vec::with_capacity(n_rows);
    let mut tenure = Vec::with_capacity(n_rows);
    let mut age_dev = Vec::with_capacity(n_rows);
    let mut dev_num = Vec::with_capacity(n_rows);
    let mut dualsim = Vec::with_capacity(n_rows);
    let mut featurephone = Vec::with_capacity(n_rows);
    let mut smartphone = Vec::with_capacity(n_rows);
    let mut target = Vec::with_capacity(n_rows);

    for _ in 0..n_rows {
        let row_age: f32 = rng.gen_range(18.0..80.0f32).round();
        let is_smart = rng.gen_bool(0.8);
        let is_dual = rng.gen_bool(0.4);
        let region = pick(&mut rng, &REGIONS);
        let gender = if rng.gen_bool(0.5) { "m" } else { "f" };

        let mut score = if row_age < 35.0 { 1.0 } else { -1.0 };
        score += if is_dual { 1.5 } else { -0.5 };
        score += if region == "capital" || region == "north" { 0.8 } else { -0.4 };
        score += rng.gen_range(-0.6..0.6);
        target.push(if score > 0.5 { 1.0 } else { 0.0 });

        text[0].push(Some(pick(&mut rng, &TARIFFS).to_string()));
        text[1].push(Some(gender.to_string()));
        text[2].push(Some(pick(&mut rng, &MANUFACTURERS).to_string()));
        text[3].push(Some(pick(&mut rng, &OS_NAMES).to_string()));
        text[4].push(Some(pick(&mut rng, &SIM_TYPES).to_string()));
        text[5].push((!rng.gen_bool(0.05)).then(|| region.to_string()));

        age.push(if rng.gen_bool(0.05) { f32::NAN } else { row_age });
        tenure.push(rng.gen_range(1.0..240.0f32).round());
        age_dev.push(rng.gen_range(0.0..2000.0f32).round());
        dev_num.push(rng.gen_range(1..5) as f32);
        dualsim.push(f32::from(u8::from(is_dual)));
        featurephone.push(f32::from(u8::from(!is_smart)));
        smartphone.push(f32::from(u8::from(is_smart)));
    }

    let mut text = text.into_iter();
    let mut next_text = || ColumnData::Text(text.next().unwrap_or_default());
    let trf = next_text();
    let gndr = next_text();
    let dev_man = next_text();
    let device_os_name = next_text();
    let simcard_type = next_text();
    let region = next_text();

    TabularTable::new(vec![
        Column::new("trf", trf),
        Column::numeric("age", age),
        Column::new("gndr", gndr),
        Column::numeric("tenure", tenure),
        Column::numeric("age_dev", age_dev),
        Column::new("dev_man", dev_man),
        Column::new("device_os_name", device_os_name),
        Column::numeric("dev_num", dev_num),
        Column::numeric("is_dualsim", dualsim),
        Column::numeric("is_featurephone", featurephone),
        Column::numeric("is_smartphone", smartphone),
        Column::new("simcard_type", simcard_type),
        Column::new("region", region),
        Column::numeric(TARGET, target),
    ])
    .expect("synthetic columns have equal length")
}

/// Small, fast configuration for tests.
pub fn small_config() -> PipelineConfig {
    PipelineConfig::builder()
        .n_trees(15)
        .learning_rate(0.3)
        .tree(TreeParams {
            max_depth: 3,
            max_bins: 32,
        })
        .sampling(SamplingParams {
            subsample: 1.0,
            colsample_bytree: 1.0,
        })
        .build()
        .expect("test config is valid")
}

/// A pipeline fitted once per process on [`synthetic_multisim`] data.
pub fn fitted_pipeline() -> ClassificationPipeline {
    static PIPELINE: OnceLock<ClassificationPipeline> = OnceLock::new();
    PIPELINE
        .get_or_init(|| {
            ClassificationPipeline::fit(&synthetic_multisim(400, 7), TARGET, &small_config())
                .expect("synthetic data fits")
        })
        .clone()
}

/// Render a table as CSV bytes.
pub fn to_csv(table: &TabularTable) -> Vec<u8> {
    let mut bytes = Vec::new();
    crate::table::io::csv::write_csv(table, &mut bytes).expect("in-memory write");
    bytes
}
