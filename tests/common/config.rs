//! Test configuration pointing every path into a temp directory and every URL at a mock server

use irs990_etl::Config;
use tempfile::TempDir;

/// Config rooted in `temp`, reading index pages from `server_uri`
pub fn test_config(temp: &TempDir, server_uri: &str) -> Config {
    let mut config = Config::default();
    config.source.filings_index_url = format!("{}/downloads", server_uri);
    config.source.schemas_index_url = format!("{}/schemas", server_uri);
    config.storage.filings_dir = temp.path().join("data/990_zips");
    config.storage.schemas_dir = temp.path().join("data/990_xsd");
    config.storage.output_csv = temp.path().join("irs_990_data.csv");
    config.schema_gen.output_dir = temp.path().join("generated");
    config.download.max_concurrent_downloads = 2;
    config.flatten.workers = Some(2);
    config
}
