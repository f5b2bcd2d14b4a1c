//! End-to-end pipeline tests

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use klineforge::fetch::{KlineRequest, KlineSource};
    use klineforge::model::{train_test_split, ForestModel, ForestTask};
    use klineforge::table::{read_table_csv, write_table_csv};
    use klineforge::{
        compute_features, prepare_features, FittedPipeline, HistoricalFetcher, Interval, Kline,
        KlineSeries, RunMode, Settings, SourceError,
    };
    use std::path::PathBuf;

    const JAN_2024: i64 = 1_704_067_200_000;

    fn ramp_klines(rows: usize) -> Vec<Kline> {
        let hour = Interval::Hour1.duration_ms();
        (0..rows)
            .map(|i| {
                let close = 100.0 + i as f64;
                Kline {
                    open_time: JAN_2024 + i as i64 * hour,
                    open: close - 0.5,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1000.0 + ((i * 37) % 11) as f64 * 25.0,
                    close_time: JAN_2024 + (i as i64 + 1) * hour - 1,
                    quote_asset_volume: close * 1000.0,
                    number_of_trades: 100 + (i % 13) as u64,
                    taker_buy_base_asset_volume: 500.0,
                    taker_buy_quote_asset_volume: close * 500.0,
                    ignore: 0.0,
                }
            })
            .collect()
    }

    fn ramp(rows: usize) -> KlineSeries {
        KlineSeries::new("BTCUSDC", Interval::Hour1, ramp_klines(rows))
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("klineforge_{}_{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Serves a fixed kline history with exchange paging semantics
    struct FakeExchange {
        klines: Vec<Kline>,
    }

    #[async_trait]
    impl KlineSource for FakeExchange {
        async fn fetch_klines(&self, request: &KlineRequest) -> Result<Vec<Kline>, SourceError> {
            Ok(self
                .klines
                .iter()
                .filter(|k| k.open_time >= request.start_time)
                .take(request.limit)
                .cloned()
                .collect())
        }
    }

    // ============================================================================
    // Training
    // ============================================================================

    #[test]
    fn test_ramp_produces_expected_tensor() {
        let settings = Settings::default();
        let prepared = prepare_features(&ramp(250), &settings, RunMode::Training).unwrap();
        let (_, sequences) = FittedPipeline::fit(&prepared, &settings).unwrap();

        assert_eq!(sequences.windows.dim(), (206, 30, 50));
        assert!(sequences.windows.iter().all(|v| v.is_finite()));

        let labels = sequences.labels.unwrap();
        assert_eq!(labels.len(), 206);
        assert!(labels.iter().all(|&l| l == 0.0 || l == 1.0));
    }

    #[test]
    fn test_prepared_table_is_numeric_and_complete() {
        let settings = Settings::default();
        let prepared = prepare_features(&ramp(120), &settings, RunMode::Training).unwrap();
        let label = settings.label_column().unwrap();

        assert!(prepared.contains(&label));
        assert!(!prepared.contains("open_time"));
        assert!(!prepared.contains("number_of_trades"));
        for (name, column) in prepared.iter() {
            let values = column.as_float().unwrap();
            assert!(values.iter().all(|v| !v.is_nan()), "NaN left in {}", name);
        }
    }

    #[test]
    fn test_both_label_modes_train_and_replay() {
        let mut settings = Settings::default();
        settings.labeling.regression = true;
        settings.labeling.classification = true;
        let prepared = prepare_features(&ramp(250), &settings, RunMode::Training).unwrap();
        let (fitted, sequences) = FittedPipeline::fit(&prepared, &settings).unwrap();
        assert_eq!(sequences.windows.dim(), (206, 30, 50));

        let forward_return = "marker_close_pct_change_in_next_14_periods".to_string();
        assert!(!fitted.scaler.feature_names().contains(&forward_return));

        let live = prepare_features(&ramp(250), &settings, RunMode::Inference).unwrap();
        let replayed = fitted.transform(&live).unwrap();
        assert_eq!(replayed.windows.dim(), (206, 30, 50));
    }

    #[test]
    fn test_inference_has_no_labels() {
        let settings = Settings::default();
        let prepared = prepare_features(&ramp(80), &settings, RunMode::Inference).unwrap();
        assert!(!prepared.contains(&settings.label_column().unwrap()));
    }

    // ============================================================================
    // Inference with persisted state
    // ============================================================================

    #[test]
    fn test_fitted_state_round_trips_and_replays() {
        let settings = Settings::default();
        let prepared = prepare_features(&ramp(250), &settings, RunMode::Training).unwrap();
        let (fitted, _) = FittedPipeline::fit(&prepared, &settings).unwrap();

        let live = KlineSeries::new("BTCUSDC", Interval::Hour1, ramp_klines(250)[190..].to_vec());
        let live = prepare_features(&live, &settings, RunMode::Inference).unwrap();
        let before = fitted.transform(&live).unwrap();
        // 60 rows, window 30, horizon 14
        assert_eq!(before.windows.dim(), (16, 30, 50));
        assert!(before.labels.is_none());
        assert!(before.windows.iter().all(|v| v.is_finite()));

        let path = scratch_dir("pipeline").join("btc_pipeline.json");
        fitted.save(&path).unwrap();
        let loaded = FittedPipeline::load(&path).unwrap();
        assert_eq!(loaded.label_column, fitted.label_column);
        assert_eq!(loaded.scaler.columns.len(), fitted.scaler.columns.len());

        let after = loaded.transform(&live).unwrap();
        for (a, b) in before.windows.iter().zip(after.windows.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_calculated_checkpoint_trains_like_memory() {
        let settings = Settings::default();
        let calculated = compute_features(&ramp(200), &settings, RunMode::Training).unwrap();

        let path = scratch_dir("checkpoint").join("btc_calculated.csv");
        write_table_csv(&calculated, &path).unwrap();
        let reloaded = read_table_csv(&path).unwrap();
        assert_eq!(reloaded.column_names(), calculated.column_names());

        let from_disk = klineforge::cleaning::finalize_columns(
            reloaded,
            &klineforge::cleaning::DEFAULT_DROP_COLUMNS,
        )
        .unwrap();
        let (_, sequences) = FittedPipeline::fit(&from_disk, &settings).unwrap();
        assert_eq!(sequences.len(), 200 - 30 - 14);
    }

    // ============================================================================
    // Fetch -> features -> model
    // ============================================================================

    #[tokio::test]
    async fn test_fake_exchange_end_to_end() {
        let mut settings = Settings::default();
        settings.fetch.page_limit = 100;
        settings.fetch.page_delay_ms = 0;
        settings.labeling.classification = false;
        settings.labeling.regression = true;
        settings.sequence.n_components = 10;

        let fetcher = HistoricalFetcher::new(
            FakeExchange {
                klines: ramp_klines(250),
            },
            &settings.fetch,
        );
        let series = fetcher
            .fetch_full_history("BTCUSDC", "1h", "1 Jan, 2024")
            .await
            .unwrap();
        assert_eq!(series.len(), 250);

        let prepared = prepare_features(&series, &settings, RunMode::Training).unwrap();
        let (_, sequences) = FittedPipeline::fit(&prepared, &settings).unwrap();
        assert_eq!(sequences.feature_width(), 10);

        let (train, test) = train_test_split(&sequences, 0.2, 42);
        assert_eq!(train.len() + test.len(), sequences.len());
        let model = ForestModel::fit(&train, ForestTask::Regression, 5, Some(6), 42).unwrap();
        let report = model.evaluate(&test).unwrap();
        assert!(report.mse.unwrap().is_finite());
    }
}
