use std::fs;
use std::path::PathBuf;

use loadprep::{
    init_logging, log_app_start, logging_config_from_env, run_pipeline, PipelineConfig, Table,
    ALL_REGIONS,
};
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging = logging_config_from_env();
    init_logging(&logging)?;
    log_app_start("third_pass", &logging);

    let data_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data/interim"));

    let cfg = PipelineConfig {
        verify_no_nulls: true,
        ..PipelineConfig::default()
    };

    for region in ALL_REGIONS {
        let input = region.second_pass_path(&data_dir);
        let output = region.third_pass_path(&data_dir);

        println!(
            "Parsing {}",
            input
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default()
        );

        let table = Table::read_csv_path(&input)?;
        let (table, report) = run_pipeline(table, &cfg)?;
        table.write_csv_path(&output)?;

        let report_path = output.with_extension("report.json");
        fs::write(&report_path, serde_json::to_vec_pretty(&report)?)?;

        info!(
            component = "third_pass",
            event = "region.finish",
            region = region.as_str(),
            city = region.city(),
            input_rows = report.input_rows,
            output_rows = report.output_rows,
            warmup_boundary = report.warmup_boundary,
            holiday_dates_repaired = report.holiday_dates_repaired,
            pruned_columns = report.pruned_columns.len(),
            output = %output.display()
        );
    }

    Ok(())
}
