use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use httptest::matchers::{all_of, contains, request, url_decoded};
use httptest::responders::json_encoded;
use httptest::{Expectation, Server};
use parking_lot::Mutex;
use serde_json::json;
use tempfile::tempdir;

use barathon_lib::cache::{CacheSnapshot, CoordinateCache};
use barathon_lib::config::AppConfig;
use barathon_lib::venue::{Coordinate, VenueRecord};
use barathon_lib::{run, RunOptions, Session};

const SHEET: &str = "Bar;Adresse;Code Postal;Note;Latitude;Longitude
Chez Jules;12 rue Haute;1000;;;
Moeder Lambic;Rue de Savoie 68;1060;4,5;50.8279;4.3467
";

const FULL_QUERY: &str = "Chez Jules 12 rue Haute 1000 Bruxelles Belgique";
const STREET_QUERY: &str = "12 rue Haute 1000 Bruxelles Belgique";

fn config_for(server: &Server) -> AppConfig {
    let mut config = AppConfig::from_env();
    config.geocode_enabled = true;
    config.geocode_delay_ms = 0;
    config.geocode_limit_per_load = 10;
    config.geocode_endpoint = server.url("/").to_string();
    config.default_city = "Bruxelles".into();
    config.default_country = "Belgique".into();
    config.geocode_contact_email = None;
    config.geocode_api_key = None;
    config
}

fn write_sheet(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("bars.csv");
    fs::write(&path, SHEET).unwrap();
    path
}

#[tokio::test]
async fn geocodes_once_then_serves_from_cache() {
    let mut server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/search"),
            request::query(url_decoded(contains(("q", FULL_QUERY)))),
        ])
        .respond_with(json_encoded(json!([{
            "lat": "50.8386",
            "lon": "4.3453",
            "boundingbox": ["50.8300", "50.8450", "4.3380", "4.3530"],
            "category": "place",
            "type": "suburb",
            "importance": 0.4,
            "place_rank": 20
        }]))),
    );
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/search"),
            request::query(url_decoded(contains(("q", STREET_QUERY)))),
        ])
        .respond_with(json_encoded(json!([{
            "lat": "50.8410",
            "lon": "4.3470",
            "boundingbox": ["50.8409", "50.8411", "4.3469", "4.3471"],
            "category": "building",
            "type": "yes",
            "importance": 0.1,
            "place_rank": 30,
            "address": { "house_number": "12" }
        }]))),
    );

    let data_dir = tempdir().unwrap();
    let sheet = write_sheet(data_dir.path());
    let expected = Coordinate::new(50.841, 4.347).unwrap();

    {
        let session = Session::initialize(data_dir.path(), config_for(&server)).unwrap();
        let mut records = session.load_records(&sheet).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[1].is_coordinate_complete());
        assert_eq!(
            records[0].candidate_queries(),
            [FULL_QUERY.to_string(), STREET_QUERY.to_string()]
        );

        let resolved = Mutex::new(Vec::new());
        let sink = |record: &VenueRecord| resolved.lock().push(record.name.clone());
        let stats = session.enrich(&mut records, &sink, None).await.unwrap();

        assert_eq!(stats.pending, 1);
        assert_eq!(stats.geocoded, 1);
        assert_eq!(records[0].coordinate(), Some(expected));
        assert_eq!(*resolved.lock(), vec!["Chez Jules".to_string()]);

        let signature = format!("{FULL_QUERY} || {STREET_QUERY}");
        assert_eq!(session.cache().lookup(&signature).unwrap(), Some(expected));
        assert_eq!(session.health().unwrap().cache_entries, 1);
    }
    server.verify_and_clear();

    let session = Session::initialize(data_dir.path(), config_for(&server)).unwrap();
    let mut records = session.load_records(&sheet).unwrap();
    let stats = session
        .enrich(&mut records, &|_: &VenueRecord| {}, Some(Arc::new(AtomicBool::new(false))))
        .await
        .unwrap();

    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.geocoded, 0);
    assert_eq!(records[0].coordinate(), Some(expected));
}

#[tokio::test]
async fn disabled_run_reports_progress_and_round_trips_cache_snapshots() {
    let dir = tempdir().unwrap();
    let sheet = write_sheet(dir.path());
    let import = dir.path().join("seed.json");
    let export = dir.path().join("dump.json");
    fs::write(
        &import,
        json!({ format!("{FULL_QUERY} || {STREET_QUERY}"): { "lat": 50.841, "lon": 4.347 } })
            .to_string(),
    )
    .unwrap();

    let options = RunOptions {
        input: sheet,
        data_dir: dir.path().join("data"),
        import_cache: Some(import),
        export_cache: Some(export.clone()),
        ..RunOptions::default()
    };
    let report = run(&options, Arc::new(AtomicBool::new(false))).await.unwrap();

    assert_eq!(report.records.len(), 2);
    assert_eq!(report.stats.pending, 1);
    assert_eq!(report.stats.geocoded, 0);
    assert_eq!(report.progress.total, 1);
    assert_eq!(report.progress.visited, 1);
    assert_eq!(report.progress.percent, 100);
    assert!(!report.records[0].on_map);
    assert!(report.records[1].tags.contains(&"CP 1060".to_string()));

    let exported: CacheSnapshot =
        serde_json::from_str(&fs::read_to_string(&export).unwrap()).unwrap();
    assert_eq!(exported.len(), 1);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["records"][1]["lat"], json!(50.8279));
    assert_eq!(json["records"][1]["name"], json!("Moeder Lambic"));
    assert!(json["records"][0]["lat"].is_null());
}
