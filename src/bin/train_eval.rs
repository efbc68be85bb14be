use std::path::PathBuf;

use loadprep::{
    evaluate, extract_dataset, fit_linear, init_logging, log_app_start, logging_config_from_env,
    DatasetConfig, Region, Table,
};
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging = logging_config_from_env();
    init_logging(&logging)?;
    log_app_start("train_eval", &logging);

    let args: Vec<String> = std::env::args().collect();
    let data_dir = args
        .get(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data/interim"));
    let region = match args.get(2) {
        Some(raw) => Region::parse(raw)
            .ok_or_else(|| format!("unknown region '{raw}' (expected caiso|ercot|isone|nyiso|pjm|spp)"))?,
        None => Region::Ercot,
    };

    let input = region.third_pass_path(&data_dir);
    println!(
        "Evaluating {} ({}) from {}",
        region.as_str(),
        region.city(),
        input.display()
    );

    let table = Table::read_csv_path(&input)?;
    let cfg = DatasetConfig::default();
    let dataset = extract_dataset(&table, &cfg)?;
    let (train, test) = dataset.split_holdout(cfg.holdout_rows)?;

    info!(
        component = "train_eval",
        event = "dataset.split",
        region = region.as_str(),
        features = train.feature_names.len(),
        training_rows = train.len(),
        holdout_rows = test.len()
    );

    let model = fit_linear(&train.rows, &train.targets)?;
    let predictions = model.predict(&test.rows);
    let metrics = evaluate(&test.targets, &predictions)?;

    println!("Mean Squared Error: {:.2}", metrics.mse);
    println!("R2 Score: {:.3}", metrics.r2);
    println!("MAPE: {:.4}", metrics.mape);

    Ok(())
}
