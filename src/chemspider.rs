use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use scraper::{Html, Selector};

use crate::domain::{Casrn, ChemSpiderLink, Smiles};
use crate::error::PipelineError;

pub const DEFAULT_BASE_URL: &str = "https://legacy.chemspider.com";

/// ChemSpider blocks generic client agents; the scrape only works with a
/// browser-style User-Agent.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/86.0.4240.183 Safari/537.36";

const RESULT_COUNT_ID: &str =
    "ctl00_ctl00_ContentSection_ContentPlaceHolder1_ResultStatementControl1_plhCountMessage";
const SMILES_SPAN_ID: &str = "ctl00_ctl00_ContentSection_ContentPlaceHolder1_RecordViewDetails_rptDetailsView_ctl00_moreDetails_WrapControl2";

/// The descriptor set scraped for the fixed-column property sheets.
pub const FIXED_PROPERTIES: [&str; 11] = [
    "#Freely Rotating Bonds",
    "#H bond acceptors",
    "#H bond donors",
    "ACD/LogD (pH 7.4)",
    "ACD/LogP",
    "Boiling Point",
    "Density",
    "Enthalpy of Vaporization",
    "Polar Surface Area",
    "Polarizability",
    "Surface Tension",
];

pub trait ChemSpiderClient: Send + Sync {
    /// Resolve a CASRN to its record page URL via the legacy search form.
    /// Succeeds only when the page reports exactly one result.
    fn search_link(&self, casrn: &Casrn) -> Result<ChemSpiderLink, PipelineError>;

    /// Scrape the SMILES string from a record page.
    fn fetch_smiles(&self, link: &ChemSpiderLink) -> Result<Smiles, PipelineError>;

    /// Scrape every property title/value pair from a record page. Values
    /// are the raw cell text; callers reduce them to numbers.
    fn fetch_properties(
        &self,
        link: &ChemSpiderLink,
    ) -> Result<BTreeMap<String, String>, PipelineError>;
}

#[derive(Clone)]
pub struct ChemSpiderHttpClient {
    client: Client,
    base_url: String,
}

impl ChemSpiderHttpClient {
    pub fn new(base_url: &str) -> Result<Self, PipelineError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(BROWSER_USER_AGENT),
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| PipelineError::ChemSpiderHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn search_url(&self, casrn: &Casrn) -> String {
        format!("{}/Search.aspx?q={}", self.base_url, casrn.as_str())
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, PipelineError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "ChemSpider request failed".to_string());
        Err(PipelineError::ChemSpiderStatus { status, message })
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, PipelineError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(PipelineError::ChemSpiderHttp(err.to_string()));
                }
            }
        }
    }

    fn fetch_page(&self, url: &str) -> Result<String, PipelineError> {
        let response = self.send_with_retries(|| self.client.get(url))?;
        let response = Self::handle_status(response)?;
        response
            .text()
            .map_err(|err| PipelineError::ChemSpiderHttp(err.to_string()))
    }
}

impl ChemSpiderClient for ChemSpiderHttpClient {
    fn search_link(&self, casrn: &Casrn) -> Result<ChemSpiderLink, PipelineError> {
        let url = self.search_url(casrn);
        let response = self.send_with_retries(|| self.client.get(&url))?;
        let response = Self::handle_status(response)?;
        // The search redirects to the record page on a unique hit; the
        // post-redirect URL is the link we want.
        let final_url = response.url().to_string();
        let body = response
            .text()
            .map_err(|err| PipelineError::ChemSpiderHttp(err.to_string()))?;
        if !page_has_single_result(&body) {
            return Err(PipelineError::Extraction(format!(
                "no single result found for {}",
                casrn.as_str()
            )));
        }
        final_url.parse()
    }

    fn fetch_smiles(&self, link: &ChemSpiderLink) -> Result<Smiles, PipelineError> {
        let body = self.fetch_page(link.as_str())?;
        let raw = extract_smiles(&body).ok_or_else(|| {
            PipelineError::Extraction(format!("SMILES not found on page: {link}"))
        })?;
        raw.parse()
    }

    fn fetch_properties(
        &self,
        link: &ChemSpiderLink,
    ) -> Result<BTreeMap<String, String>, PipelineError> {
        let body = self.fetch_page(link.as_str())?;
        Ok(extract_property_rows(&body))
    }
}

/// True when the search page reports exactly one hit for the query.
pub fn page_has_single_result(html: &str) -> bool {
    let document = Html::parse_document(html);
    let selector = Selector::parse(&format!("h3#{RESULT_COUNT_ID}")).unwrap();
    document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>().contains("Found 1 result"))
        .unwrap_or(false)
}

/// The SMILES string from a record page, if the details span is present.
pub fn extract_smiles(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(&format!("span#{SMILES_SPAN_ID}")).unwrap();
    document.select(&selector).next().map(|element| {
        element
            .text()
            .collect::<String>()
            .split_whitespace()
            .collect::<String>()
    })
}

/// Every property title/value pair from the predicted-properties table:
/// each `tr` pairing a `td.prop_title` with a `td.prop_value_nowrap`
/// (falling back to `td.prop_value`).
pub fn extract_property_rows(html: &str) -> BTreeMap<String, String> {
    let document = Html::parse_document(html);
    let row_selector = Selector::parse("tr").unwrap();
    let title_selector = Selector::parse("td.prop_title").unwrap();
    let nowrap_selector = Selector::parse("td.prop_value_nowrap").unwrap();
    let value_selector = Selector::parse("td.prop_value").unwrap();

    let mut properties = BTreeMap::new();
    for row in document.select(&row_selector) {
        let Some(title) = row.select(&title_selector).next() else {
            continue;
        };
        let value = row
            .select(&nowrap_selector)
            .next()
            .or_else(|| row.select(&value_selector).next());
        let Some(value) = value else {
            continue;
        };
        let title = title.text().collect::<String>().trim().to_string();
        let value = value.text().collect::<String>().trim().to_string();
        if !title.is_empty() {
            properties.insert(title, value);
        }
    }
    properties
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
