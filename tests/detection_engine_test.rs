//! End-to-end tests of the anomaly-detection engine contract:
//! threshold boundaries, statistical gating, haversine filtering, regional
//! de-duplication, idempotence, and the output-size bound.

use std::collections::BTreeMap;

use proptest::prelude::*;
use serde_json::json;

use airsense_api::models::{AnomalyKind, Pollutant, Reading, Severity, ThresholdTable};
use airsense_api::services::detection::{DetectionConfig, DetectionEngine};
use airsense_api::services::geo::haversine_km;

fn reading(lat: f64, lon: f64, timestamp: &str, params: &[(&str, f64)]) -> Reading {
    Reading {
        id: None,
        latitude: lat,
        longitude: lon,
        timestamp: timestamp.to_string(),
        parameters: params
            .iter()
            .map(|(code, value)| (code.to_string(), json!(value)))
            .collect(),
    }
}

fn engine() -> DetectionEngine {
    DetectionEngine::from_config(DetectionConfig::default())
}

const CURRENT_TS: &str = "2024-03-01T12:00:00Z";
const HISTORY_TS: &str = "2024-03-01T11:00:00Z";

#[test]
fn threshold_band_for_every_pollutant() {
    let table = ThresholdTable::who_defaults();
    let engine = engine();

    for (code, pollutant) in [
        ("PM2.5", Pollutant::Pm25),
        ("PM10", Pollutant::Pm10),
        ("NO2", Pollutant::No2),
        ("SO2", Pollutant::So2),
        ("O3", Pollutant::O3),
    ] {
        let guideline = table.guideline(pollutant).unwrap();
        let dangerous = table.dangerous(pollutant).unwrap();

        // Exactly at the guideline: clean
        let records = engine.evaluate(&reading(0.0, 0.0, CURRENT_TS, &[(code, guideline)]), &[]);
        assert!(records.is_empty(), "{code} at guideline should be clean");

        // Inside (guideline, dangerous]: exactly one warning
        for value in [guideline + 0.01, dangerous] {
            let records = engine.evaluate(&reading(0.0, 0.0, CURRENT_TS, &[(code, value)]), &[]);
            assert_eq!(records.len(), 1, "{code} at {value}");
            assert_eq!(records[0].kind, AnomalyKind::ThresholdExceeded);
            assert_eq!(records[0].severity, Severity::Warning);
        }

        // Above dangerous: danger
        let records =
            engine.evaluate(&reading(0.0, 0.0, CURRENT_TS, &[(code, dangerous + 0.01)]), &[]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, Severity::Danger);
    }
}

#[test]
fn statistical_detector_never_fires_below_five_points() {
    let engine = engine();
    // Four points of flat history, and a current value a thousand-fold higher
    let history: Vec<Reading> = (0..4)
        .map(|_| reading(0.0, 0.0, HISTORY_TS, &[("PM2.5", 10.0)]))
        .collect();
    let current = reading(0.0, 0.0, CURRENT_TS, &[("PM2.5", 10_000.0)]);

    let records = engine.evaluate(&current, &history);
    assert!(records
        .iter()
        .all(|r| r.kind != AnomalyKind::StatisticalAnomaly));
}

#[test]
fn reference_z_score_case_emits_one_warning() {
    // Historical PM2.5 [18,19,20,21,22]: mean 20, population std ~1.414.
    // Current 26: z ~4.24 (fires, not danger), percent change 30% (silent).
    let engine = engine();
    let history: Vec<Reading> = [18.0, 19.0, 20.0, 21.0, 22.0]
        .iter()
        .map(|v| reading(0.0, 0.0, HISTORY_TS, &[("PM2.5", *v)]))
        .collect();
    let current = reading(0.0, 0.0, CURRENT_TS, &[("PM2.5", 26.0)]);

    let records = engine.evaluate(&current, &history);
    let statistical: Vec<_> = records
        .iter()
        .filter(|r| r.kind == AnomalyKind::StatisticalAnomaly)
        .collect();
    assert_eq!(statistical.len(), 1);
    assert_eq!(statistical[0].severity, Severity::Warning);
    assert!(statistical[0].message.contains("Z-score"));
}

#[test]
fn haversine_reference_distances() {
    let near = haversine_km(0.0, 0.0, 0.0, 0.1);
    assert!((near - 11.12).abs() < 0.01, "got {near}");
    assert!(near <= 25.0);

    let far = haversine_km(0.0, 0.0, 0.0, 1.0);
    assert!((far - 111.19).abs() < 0.01, "got {far}");
    assert!(far > 25.0);
}

#[test]
fn regional_dedup_suppresses_only_the_duplicated_pollutant() {
    let engine = engine();

    // Neighbours carry both NO2 and PM2.5 at low, flat values
    let history: Vec<Reading> = (0..5)
        .map(|_| reading(0.0, 0.05, HISTORY_TS, &[("NO2", 10.0), ("PM2.5", 10.0)]))
        .collect();
    // NO2 spikes (statistical + regional conditions both hold); PM2.5 stays
    // close to the mean so nothing should fire for it
    let current = reading(0.0, 0.0, CURRENT_TS, &[("NO2", 90.0), ("PM2.5", 9.0)]);

    let records = engine.evaluate(&current, &history);

    // NO2: statistical fires, so its regional duplicate is suppressed
    let no2_kinds: Vec<_> = records
        .iter()
        .filter(|r| r.parameter == Pollutant::No2)
        .map(|r| r.kind)
        .collect();
    assert!(no2_kinds.contains(&AnomalyKind::StatisticalAnomaly));
    assert!(!no2_kinds.contains(&AnomalyKind::RegionalAnomaly));

    // PM2.5 at 9 vs a flat mean of 10: no detector fires, proving the NO2
    // suppression did not leak across pollutants
    assert!(records.iter().all(|r| r.parameter != Pollutant::Pm25));
}

#[test]
fn regional_finding_survives_when_statistics_are_silent() {
    let engine = engine();

    // Three window entries: below the statistical minimum, so only the
    // regional detector can fire. Neighbours sit ~11 km away, inside the
    // 25 km radius.
    let history: Vec<Reading> = (0..3)
        .map(|_| reading(0.0, 0.1, HISTORY_TS, &[("PM2.5", 10.0)]))
        .collect();
    let current = reading(0.0, 0.0, CURRENT_TS, &[("PM2.5", 100.0)]);

    let records = engine.evaluate(&current, &history);
    assert_eq!(
        records
            .iter()
            .filter(|r| r.kind == AnomalyKind::RegionalAnomaly)
            .count(),
        1
    );
}

#[test]
fn output_is_ordered_by_detector() {
    let engine = engine();
    let history: Vec<Reading> = (0..5)
        .map(|_| reading(0.0, 0.05, HISTORY_TS, &[("NO2", 10.0)]))
        .collect();
    // SO2 breaches its threshold only; NO2 deviates statistically only
    let current = reading(0.0, 0.0, CURRENT_TS, &[("SO2", 90.0), ("NO2", 20.0)]);

    let records = engine.evaluate(&current, &history);
    let kinds: Vec<_> = records.iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        vec![
            AnomalyKind::ThresholdExceeded,
            AnomalyKind::StatisticalAnomaly
        ]
    );
}

prop_compose! {
    fn arb_params()(values in prop::collection::btree_map(
        prop::sample::select(vec!["PM2.5", "PM10", "NO2", "SO2", "O3"]),
        0.0f64..500.0,
        1..5,
    )) -> BTreeMap<String, serde_json::Value> {
        values
            .into_iter()
            .map(|(code, value)| (code.to_string(), json!(value)))
            .collect()
    }
}

proptest! {
    #[test]
    fn evaluation_is_idempotent_and_bounded(
        params in arb_params(),
        history_values in prop::collection::vec(0.0f64..500.0, 0..20),
    ) {
        let engine = engine();
        let history: Vec<Reading> = history_values
            .iter()
            .map(|v| reading(0.0, 0.02, HISTORY_TS, &[("PM2.5", *v), ("NO2", *v)]))
            .collect();
        let current = Reading {
            id: None,
            latitude: 0.0,
            longitude: 0.0,
            timestamp: CURRENT_TS.to_string(),
            parameters: params.clone(),
        };

        let first = engine.evaluate(&current, &history);
        let second = engine.evaluate(&current, &history);

        // Byte-for-byte idempotence
        prop_assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );

        // At most one record per detector per pollutant
        prop_assert!(first.len() <= params.len() * 3);
    }
}
