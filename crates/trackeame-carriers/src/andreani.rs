//! Andreani.
//!
//! The tracking page at `/envio/{code}` draws its timeline client-side, so in
//! production this adapter is paired with the [`RenderedFetcher`]. The
//! timeline sometimes loads collapsed; the first child of the shipment
//! container toggles it open. Each timeline item carries a date span, a time
//! span such as `"14:32 hs."`, an `h5` description and, next to it, the
//! location in bold.
//!
//! [`RenderedFetcher`]: crate::fetch::RenderedFetcher

use std::sync::Arc;

use async_trait::async_trait;
use scraper::{ElementRef, Html};
use trackeame_types::EventCandidate;

use crate::adapter::{CarrierAdapter, TrackRequest, check_code_shape, page_text, selector, text_of};
use crate::error::AdapterError;
use crate::fetch::{PageFetcher, PageRequest};
use crate::rules::KeywordRules;
use crate::timeline::{RawEntry, assemble, clock_before_hs};

pub const SLUG: &str = "andreani";
pub const DEFAULT_BASE_URL: &str = "https://www.andreani.com/envio/";
const CODE_LEN: usize = 15;

const TIMELINE: &str = "div[data-testid='vertical-timeline']";
const TIMELINE_TOGGLE: &str = "div[data-testid='container'] > *";
const ITEMS: &str = "ul[data-testid='vertical-timeline-item'] li";
const DATE: &str = "span[class*='_date']";
const TIME: &str = "span[class*='_time']";

#[derive(Debug)]
pub struct AndreaniAdapter {
    base_url: String,
    fetcher: Arc<dyn PageFetcher>,
    rules: Arc<KeywordRules>,
}

impl AndreaniAdapter {
    pub fn new(base_url: impl Into<String>, fetcher: Arc<dyn PageFetcher>, rules: Arc<KeywordRules>) -> Self {
        Self {
            base_url: base_url.into(),
            fetcher,
            rules,
        }
    }

    fn item_entry(item: ElementRef<'_>) -> Result<RawEntry, AdapterError> {
        let (date_sel, time_sel) = (selector(SLUG, DATE)?, selector(SLUG, TIME)?);
        let (h5_sel, bold_sel) = (selector(SLUG, "h5")?, selector(SLUG, "b")?);

        let date = item.select(&date_sel).next().map(text_of).unwrap_or_default();
        let time_text = item.select(&time_sel).next().map(text_of).unwrap_or_default();
        let time = clock_before_hs(&time_text).unwrap_or("00:00").to_owned();

        let heading = item.select(&h5_sel).next();
        let description = heading.map(text_of).unwrap_or_default();
        let location = heading
            .and_then(|h| h.parent())
            .and_then(ElementRef::wrap)
            .map(|parent| {
                parent
                    .select(&bold_sel)
                    .map(text_of)
                    .collect::<Vec<_>>()
                    .join(" ")
            });

        Ok(RawEntry {
            date,
            time,
            description,
            raw_status: None,
            location,
        })
    }

    /// Parse a rendered tracking page.
    pub fn parse_page(&self, html: &str, tracking_code: &str) -> Result<Vec<EventCandidate>, AdapterError> {
        let document = Html::parse_document(html);
        let not_found = || AdapterError::NotFound {
            carrier: SLUG.to_owned(),
            tracking_code: tracking_code.to_owned(),
        };

        let timeline_sel = selector(SLUG, TIMELINE)?;
        let Some(timeline) = document.select(&timeline_sel).next() else {
            if self.rules.signals_not_found(&page_text(&document)) {
                return Err(not_found());
            }
            return Err(AdapterError::parse(SLUG, "tracking page has no vertical timeline"));
        };

        let items_sel = selector(SLUG, ITEMS)?;
        let entries = timeline
            .select(&items_sel)
            .map(Self::item_entry)
            .collect::<Result<Vec<_>, _>>()?;
        if entries.is_empty() {
            if self.rules.signals_not_found(&page_text(&document)) {
                return Err(not_found());
            }
            return Err(AdapterError::parse(
                SLUG,
                "vertical timeline has no items; it may still be collapsed",
            ));
        }

        let scraped = entries.len();
        let events = assemble(entries, &self.rules);
        if events.is_empty() {
            return Err(AdapterError::parse(
                SLUG,
                format!("none of {scraped} timeline items had a readable date and description"),
            ));
        }
        Ok(events)
    }
}

#[async_trait]
impl CarrierAdapter for AndreaniAdapter {
    fn slug(&self) -> &str {
        SLUG
    }

    fn validate(&self, tracking_code: &str) -> Result<(), AdapterError> {
        check_code_shape(
            SLUG,
            tracking_code,
            CODE_LEN,
            "Andreani tracking codes are 15 uppercase letters or digits",
        )
    }

    async fn fetch_timeline(&self, request: &TrackRequest) -> Result<Vec<EventCandidate>, AdapterError> {
        let url = format!("{}{}", self.base_url, request.tracking_code);
        let page = PageRequest::get(url)
            .wait_for(TIMELINE)
            .reveal(TIMELINE, TIMELINE_TOGGLE);
        let html = self.fetcher.fetch(&page).await?;
        self.parse_page(&html, &request.tracking_code)
    }
}
