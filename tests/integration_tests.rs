//! Integration tests for Citation Harvester
//!
//! These tests run the full pipeline against a local listing server and
//! scripted article sessions, then read the exported files back.

use calamine::{open_workbook, Reader, Xlsx};
use citation_harvester::config::Config;
use citation_harvester::export::{ExportFormat, ExportSink};
use citation_harvester::harvest::{HarvestError, Harvester};
use citation_harvester::listing::{ListingError, ListingResolver};
use citation_harvester::models::{ArticleRecord, ResultSet, RECORD_HEADERS};
use citation_harvester::session::{MockPage, MockSessionFactory};
use citation_harvester::utils::HttpClient;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const CITATION: &str = "Smith, J. (2020).";

fn listing_html(paths: &[String]) -> String {
    let mut html = String::from(
        r#"<html><body>
        <h4 class="journal-article-listing-type">Articles</h4>"#,
    );
    for path in paths {
        html.push_str(&format!(
            r#"<div class="representation"><a class="title" href="{}">Article</a></div>"#,
            path
        ));
    }
    html.push_str(
        r#"<h4 class="journal-article-listing-type">Book Reviews</h4>
        <div class="representation"><a href="/core/review/1">Review</a></div>
        </body></html>"#,
    );
    html
}

fn article_paths(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("/core/article/{}", i)).collect()
}

fn test_config(base_url: &str, output: &Path) -> Config {
    let mut config = Config::default();
    config.site.base_url = base_url.to_string();
    config.extraction.settle_delay_ms = 0;
    config.extraction.wait_timeout_secs = 0;
    config.extraction.poll_interval_ms = 1;
    config.retry.max_attempts = 2;
    config.retry.initial_delay_ms = 0;
    config.retry.max_delay_ms = 0;
    config.output.base_path = output.to_path_buf();
    config.output.formats = vec![ExportFormat::Csv, ExportFormat::Xlsx];
    config
}

fn read_csv(path: &Path) -> Vec<Vec<String>> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .unwrap()
        .records()
        .map(|r| r.unwrap().iter().map(String::from).collect())
        .collect()
}

fn read_xlsx(path: &Path) -> Vec<Vec<String>> {
    let mut workbook: Xlsx<_> = open_workbook(path).unwrap();
    let range = workbook.worksheet_range("Sheet1").unwrap();
    range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect()
}

async fn serve_listing(server: &mut mockito::ServerGuard, body: &str) -> mockito::Mock {
    server
        .mock("GET", "/issue")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(body)
        .create_async()
        .await
}

#[tokio::test]
async fn test_end_to_end_three_articles() {
    let mut server = mockito::Server::new_async().await;
    let paths = article_paths(3);
    let listing = serve_listing(&mut server, &listing_html(&paths)).await;

    let factory = paths.iter().enumerate().fold(MockSessionFactory::new(), |factory, (i, path)| {
        factory.with_page(
            &format!("{}{}", server.url(), path),
            MockPage::article(&format!("A{}", i + 1), &["Univ X", "Univ Y"], CITATION),
        )
    });
    let factory = Arc::new(factory);

    let dir = TempDir::new().unwrap();
    let config = test_config(&server.url(), &dir.path().join("output"));
    let harvester = Harvester::new(&config, HttpClient::new().unwrap(), factory.clone()).unwrap();

    let summary = harvester
        .run(&format!("{}/issue", server.url()))
        .await
        .unwrap();
    listing.assert_async().await;

    assert_eq!(summary.links, 3);
    assert_eq!(summary.records, 3);
    assert!(summary.failures.is_empty());
    assert_eq!(summary.files.len(), 2);
    assert_eq!(factory.open_sessions(), 0);

    let rows = read_csv(&dir.path().join("output.csv"));
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0], RECORD_HEADERS);

    let mut abstracts: Vec<&str> = rows[1..].iter().map(|row| row[1].as_str()).collect();
    abstracts.sort();
    assert_eq!(abstracts, vec!["A1", "A2", "A3"]);
    for row in &rows[1..] {
        assert_eq!(row[0], CITATION);
        assert_eq!(row[2], "Univ X");
        assert_eq!(row[3], "Univ Y");
    }

    assert_eq!(read_xlsx(&dir.path().join("output.xlsx")), rows);
}

#[tokio::test]
async fn test_permanent_failures_do_not_abort_run() {
    let mut server = mockito::Server::new_async().await;
    let paths = article_paths(5);
    serve_listing(&mut server, &listing_html(&paths)).await;

    let base = server.url();
    let factory = Arc::new(
        MockSessionFactory::new()
            .with_page(&format!("{}{}", base, paths[0]), MockPage::article("A1", &["U1"], CITATION))
            .with_page(
                &format!("{}{}", base, paths[1]),
                MockPage::article("A2", &["U2"], CITATION).without_abstract(),
            )
            .with_page(&format!("{}{}", base, paths[2]), MockPage::article("A3", &["U3"], CITATION))
            .with_page(&format!("{}{}", base, paths[3]), MockPage::article("A4", &["U4"], CITATION))
            .fail_navigation(&format!("{}{}", base, paths[3]), 1),
    );
    // paths[4] has no page at all

    let dir = TempDir::new().unwrap();
    let mut config = test_config(&base, &dir.path().join("partial"));
    config.output.formats = vec![ExportFormat::Csv];
    let harvester = Harvester::new(&config, HttpClient::new().unwrap(), factory.clone()).unwrap();

    let summary = harvester.run(&format!("{}/issue", base)).await.unwrap();

    assert_eq!(summary.links, 5);
    assert_eq!(summary.records, 3);
    assert_eq!(summary.failures.len(), 2);
    assert!(summary.failures.iter().all(|f| f.attempts == 2));
    assert_eq!(factory.navigations(&format!("{}{}", base, paths[3])), 2);

    let rows = read_csv(&dir.path().join("partial.csv"));
    assert_eq!(rows.len(), 4);
}

#[tokio::test]
async fn test_concurrency_bound_through_harvester() {
    let mut server = mockito::Server::new_async().await;
    let paths = article_paths(8);
    serve_listing(&mut server, &listing_html(&paths)).await;

    let factory = paths
        .iter()
        .fold(MockSessionFactory::new(), |factory, path| {
            factory.with_page(
                &format!("{}{}", server.url(), path),
                MockPage::article("A", &["Univ X"], CITATION),
            )
        })
        .navigation_delay(Duration::from_millis(20));
    let factory = Arc::new(factory);

    let dir = TempDir::new().unwrap();
    let mut config = test_config(&server.url(), &dir.path().join("output"));
    config.concurrency.workers = 2;
    let harvester = Harvester::new(&config, HttpClient::new().unwrap(), factory.clone()).unwrap();

    let summary = harvester
        .run(&format!("{}/issue", server.url()))
        .await
        .unwrap();

    assert_eq!(summary.records, 8);
    assert!(factory.peak_open_sessions() <= 2);
    assert_eq!(factory.sessions_opened(), 8);
}

#[tokio::test]
async fn test_listing_failure_writes_nothing() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/issue")
        .with_status(404)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&server.url(), &dir.path().join("output"));
    let factory = Arc::new(MockSessionFactory::new());
    let harvester = Harvester::new(&config, HttpClient::new().unwrap(), factory.clone()).unwrap();

    let result = harvester.run(&format!("{}/issue", server.url())).await;

    assert!(matches!(result, Err(HarvestError::Listing(ListingError::Fetch { .. }))));
    assert!(!dir.path().join("output.csv").exists());
    assert!(!dir.path().join("output.xlsx").exists());
    assert_eq!(factory.sessions_opened(), 0);
}

#[tokio::test]
async fn test_listing_without_section_is_structure_error() {
    let mut server = mockito::Server::new_async().await;
    serve_listing(&mut server, "<html><body><h2>Issue</h2></body></html>").await;

    let resolver = ListingResolver::new(
        HttpClient::new().unwrap(),
        &Config::default().site,
        &Config::default().selectors,
    )
    .unwrap();
    let result = resolver.resolve(&format!("{}/issue", server.url())).await;

    assert!(matches!(result, Err(ListingError::Structure { .. })));
}

#[tokio::test]
async fn test_resolver_joins_links_against_base() {
    let mut server = mockito::Server::new_async().await;
    serve_listing(&mut server, &listing_html(&article_paths(2))).await;

    let config = test_config("https://www.cambridge.org", Path::new("unused"));
    let resolver =
        ListingResolver::new(HttpClient::new().unwrap(), &config.site, &config.selectors).unwrap();
    let links = resolver.resolve(&format!("{}/issue", server.url())).await.unwrap();

    let links: Vec<&str> = links.iter().map(|l| l.as_str()).collect();
    assert_eq!(
        links,
        vec![
            "https://www.cambridge.org/core/article/1",
            "https://www.cambridge.org/core/article/2",
        ]
    );
}

#[test]
fn test_both_formats_hold_identical_rows() {
    let mut results = ResultSet::new();
    results.push(
        ArticleRecord::new(
            CITATION.to_string(),
            "First abstract".to_string(),
            &["Univ X".to_string(), "Univ Y".to_string(), "Univ Z".to_string()],
        )
        .unwrap(),
    );
    results.push(
        ArticleRecord::new(
            "Doe, J. (2019).".to_string(),
            "Second".to_string(),
            &["Univ Q".to_string()],
        )
        .unwrap(),
    );

    let dir = TempDir::new().unwrap();
    let written = ExportSink::new()
        .write(&results, &dir.path().join("both"), &[ExportFormat::Csv, ExportFormat::Xlsx])
        .unwrap();
    assert_eq!(written.len(), 2);

    let csv_rows = read_csv(&written[0]);
    let xlsx_rows = read_xlsx(&written[1]);

    assert_eq!(csv_rows.len(), 3);
    assert_eq!(csv_rows, xlsx_rows);
    assert_eq!(csv_rows[0], RECORD_HEADERS);
    assert_eq!(csv_rows[1][3], "Univ Y / Univ Z");
    assert_eq!(csv_rows[2][3], "");
}
