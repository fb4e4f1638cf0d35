//! Correo Argentino e-commerce tracking.
//!
//! The e-commerce search form posts the tracking code and answers with an
//! HTML fragment holding a `div#no-more-tables` history table whose columns
//! are date, location, description and status.

use std::sync::Arc;

use async_trait::async_trait;
use scraper::Html;
use tracing::debug;
use trackeame_types::EventCandidate;

use crate::adapter::{CarrierAdapter, TrackRequest, check_code_shape, page_text, selector, text_of};
use crate::error::AdapterError;
use crate::fetch::{PageFetcher, PageRequest};
use crate::rules::KeywordRules;
use crate::timeline::{RawEntry, assemble};

pub const SLUG: &str = "correo-argentino";
pub const DEFAULT_ENDPOINT: &str =
    "https://www.correoargentino.com.ar/sites/all/modules/custom/ca_forms/api/wsFacade.php";
const CODE_LEN: usize = 23;

const TABLE: &str = "div#no-more-tables";
const ROWS: &str = "tbody tr";

#[derive(Debug)]
pub struct CorreoArgentinoAdapter {
    endpoint: String,
    fetcher: Arc<dyn PageFetcher>,
    rules: Arc<KeywordRules>,
}

impl CorreoArgentinoAdapter {
    pub fn new(endpoint: impl Into<String>, fetcher: Arc<dyn PageFetcher>, rules: Arc<KeywordRules>) -> Self {
        Self {
            endpoint: endpoint.into(),
            fetcher,
            rules,
        }
    }

    /// Parse the history fragment returned by the e-commerce search.
    pub fn parse_page(&self, html: &str, tracking_code: &str) -> Result<Vec<EventCandidate>, AdapterError> {
        let document = Html::parse_document(html);
        let not_found = || AdapterError::NotFound {
            carrier: SLUG.to_owned(),
            tracking_code: tracking_code.to_owned(),
        };

        let table_sel = selector(SLUG, TABLE)?;
        let Some(table) = document.select(&table_sel).next() else {
            if self.rules.signals_not_found(&page_text(&document)) {
                return Err(not_found());
            }
            return Err(AdapterError::parse(SLUG, "response has no history table"));
        };

        let (row_sel, cell_sel) = (selector(SLUG, ROWS)?, selector(SLUG, "td")?);
        let rows: Vec<Vec<String>> = table
            .select(&row_sel)
            .map(|row| row.select(&cell_sel).map(text_of).collect())
            .collect();
        let total_rows = rows.len();
        let entries: Vec<RawEntry> = rows
            .into_iter()
            .filter_map(|cells| {
                let [date, location, description, status] = <[String; 4]>::try_from(cells).ok()?;
                Some(RawEntry {
                    date,
                    time: String::new(),
                    description,
                    raw_status: Some(status),
                    location: Some(location),
                })
            })
            .collect();
        let short_rows = total_rows - entries.len();
        if short_rows > 0 {
            debug!(carrier = SLUG, skipped = short_rows, "history rows without four cells");
        }

        if entries.is_empty() {
            return Err(not_found());
        }

        let scraped = entries.len();
        let events = assemble(entries.into_iter().map(split_date_time), &self.rules);
        if events.is_empty() {
            return Err(AdapterError::parse(
                SLUG,
                format!("none of {scraped} history rows had a readable date and description"),
            ));
        }
        Ok(events)
    }
}

/// The date cell reads `"07-03-2025 14:32"`; split it into the two fields
/// [`assemble`] expects.
fn split_date_time(mut entry: RawEntry) -> RawEntry {
    if let Some((date, time)) = entry.date.split_once(' ') {
        let (date, time) = (date.to_owned(), time.trim().to_owned());
        entry.date = date;
        entry.time = time;
    }
    entry
}

#[async_trait]
impl CarrierAdapter for CorreoArgentinoAdapter {
    fn slug(&self) -> &str {
        SLUG
    }

    fn validate(&self, tracking_code: &str) -> Result<(), AdapterError> {
        check_code_shape(
            SLUG,
            tracking_code,
            CODE_LEN,
            "only e-commerce tracking codes (23 uppercase letters or digits) are supported",
        )
    }

    async fn fetch_timeline(&self, request: &TrackRequest) -> Result<Vec<EventCandidate>, AdapterError> {
        let page = PageRequest::post_form(
            self.endpoint.clone(),
            [("action", "ecommerce"), ("id", request.tracking_code.as_str())],
        )
        .wait_for(TABLE);
        let html = self.fetcher.fetch(&page).await?;
        self.parse_page(&html, &request.tracking_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::PageMethod;
    use crate::fetch::testing::FixtureFetcher;
    use trackeame_types::Status;

    const CODE: &str = "000500076393019A3G0C701";

    const PAGE: &str = r#"
        <div id="no-more-tables">
          <table>
            <thead><tr><th>Fecha</th><th>Planta</th><th>Historia</th><th>Estado</th></tr></thead>
            <tbody>
              <tr><td>10-03-2025 12:15</td><td>CDD CORDOBA</td><td>INTENTO DE ENTREGA</td><td>ENTREGADO</td></tr>
              <tr><td>07-03-2025 08:00</td><td>CABA</td><td>PREIMPOSICIÓN</td><td></td></tr>
              <tr><td>08-03-2025 19:40</td><td>CTP MONTE GRANDE</td><td>EN PODER DEL DISTRIBUIDOR</td><td></td></tr>
              <tr><td colspan="4">Fin del historial</td></tr>
            </tbody>
          </table>
        </div>
    "#;

    fn adapter(page: &str) -> (CorreoArgentinoAdapter, Arc<FixtureFetcher>) {
        let fetcher = FixtureFetcher::new(page);
        let rules = Arc::new(KeywordRules::builtin(SLUG).unwrap().unwrap());
        (CorreoArgentinoAdapter::new(DEFAULT_ENDPOINT, fetcher.clone(), rules), fetcher)
    }

    fn request(code: &str) -> TrackRequest {
        TrackRequest {
            shipment_id: "shp-2".into(),
            carrier_slug: SLUG.into(),
            tracking_code: code.into(),
        }
    }

    #[tokio::test]
    async fn parses_history_table_in_ascending_order() {
        let (adapter, fetcher) = adapter(PAGE);
        let events = adapter.track(&request(CODE)).await.unwrap();

        let statuses: Vec<_> = events.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![Some(Status::Pending), Some(Status::InTransit), Some(Status::Delivered)]
        );
        assert_eq!(events[0].description.as_deref(), Some("PREIMPOSICIÓN"));
        assert_eq!(events[0].raw_status, None);
        assert_eq!(
            events[2].description.as_deref(),
            Some("INTENTO DE ENTREGA - ENTREGADO")
        );
        assert_eq!(events[2].location.as_deref(), Some("CDD CORDOBA"));
        assert_eq!(events[2].occurred_at.to_rfc3339(), "2025-03-10T15:15:00+00:00");

        let sent = fetcher.last_request().unwrap();
        assert_eq!(
            sent.method,
            PageMethod::PostForm(vec![
                ("action".into(), "ecommerce".into()),
                ("id".into(), CODE.into()),
            ])
        );
    }

    #[tokio::test]
    async fn non_ecommerce_codes_are_rejected_locally() {
        let (adapter, fetcher) = adapter(PAGE);
        for code in ["CP123456789AR", "000500076393019a3g0c701", ""] {
            let err = adapter.track(&request(code)).await.unwrap_err();
            assert!(matches!(err, AdapterError::InvalidInput { .. }), "{code}");
        }
        assert_eq!(fetcher.calls(), 0);
    }

    #[test]
    fn empty_history_is_not_found() {
        let (adapter, _) = adapter("");
        let err = adapter
            .parse_page("<div id='no-more-tables'><table><tbody></tbody></table></div>", CODE)
            .unwrap_err();
        assert!(matches!(err, AdapterError::NotFound { .. }));

        let err = adapter
            .parse_page("<p>No se encontraron resultados para su búsqueda</p>", CODE)
            .unwrap_err();
        assert!(matches!(err, AdapterError::NotFound { .. }));
    }

    #[test]
    fn unreadable_rows_are_a_parse_failure() {
        let (adapter, _) = adapter("");
        let page = "<div id='no-more-tables'><table><tbody>\
                    <tr><td>ayer</td><td>CABA</td><td>PREIMPOSICION</td><td></td></tr>\
                    </tbody></table></div>";
        let err = adapter.parse_page(page, CODE).unwrap_err();
        assert!(matches!(err, AdapterError::ParseFailure { .. }));
        assert!(err.is_retryable());
    }
}
