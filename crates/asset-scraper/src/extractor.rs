//! Page extraction: navigate to an asset page and read its indicators.
//!
//! The browser renders the page; the rendered DOM is then parsed with
//! `scraper` and walked according to the asset's [`AssetSchema`]. All value
//! normalization happens here in Rust, not inside the page.

use crate::asset::{AssetCode, AssetRecord, AssetType, FieldValue};
use crate::normalize::{normalize, parse_percentage};
use crate::renderer::RenderContext;
use crate::schema::{AssetSchema, PositionalSpec, SectionSpec, ValueKind};
use crate::session::{PageLease, SessionManager};
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Why an extraction produced no record.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The page lacks the anchor element: unknown or delisted code.
    #[error("no {asset} found for code {code}")]
    NotFound { asset: AssetType, code: String },

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("page evaluation failed: {0}")]
    Evaluation(String),

    /// The anchor was present but the page did not have the expected shape.
    #[error("unexpected page structure: {0}")]
    Malformed(String),

    #[error("browser unavailable: {0}")]
    Browser(String),
}

impl ExtractError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Reads asset pages through the shared browser session.
pub struct PageExtractor {
    session: Arc<SessionManager>,
    base_url: String,
    navigation_timeout: Duration,
}

impl PageExtractor {
    pub fn new(session: Arc<SessionManager>, base_url: &str, navigation_timeout: Duration) -> Self {
        Self {
            session,
            base_url: base_url.trim_end_matches('/').to_string(),
            navigation_timeout,
        }
    }

    /// Scrape one asset. The page is closed on every path out.
    pub async fn extract(
        &self,
        asset: AssetType,
        code: &AssetCode,
    ) -> Result<AssetRecord, ExtractError> {
        let schema = AssetSchema::for_asset(asset);
        let url = schema.url(&self.base_url, code.as_str());

        let mut lease = self
            .session
            .acquire()
            .await
            .map_err(|e| ExtractError::Browser(format!("{e:#}")))?;
        let result = self.read_page(&mut lease, schema, code, &url).await;
        self.session.release(lease).await;
        result
    }

    async fn read_page(
        &self,
        lease: &mut PageLease,
        schema: &AssetSchema,
        code: &AssetCode,
        url: &str,
    ) -> Result<AssetRecord, ExtractError> {
        let page: &mut dyn RenderContext = lease
            .page()
            .map_err(|e| ExtractError::Browser(format!("{e:#}")))?;

        let timeout_ms = self.navigation_timeout.as_millis() as u64;
        let nav = page
            .navigate(url, schema.wait, timeout_ms)
            .await
            .map_err(|e| ExtractError::Navigation(format!("{e:#}")))?;
        debug!(url = %nav.final_url, load_ms = nav.load_time_ms, "page ready");

        let html = page
            .html()
            .await
            .map_err(|e| ExtractError::Evaluation(format!("{e:#}")))?;

        parse_page(schema, code, &html)
    }
}

/// Extract a record from a rendered page according to `schema`.
///
/// Every field the schema declares is present in the result; values that
/// are missing or do not parse are `Null`.
pub fn parse_page(
    schema: &AssetSchema,
    code: &AssetCode,
    html: &str,
) -> Result<AssetRecord, ExtractError> {
    let document = Html::parse_document(html);

    let anchor = selector(schema.anchor)?;
    if document.select(&anchor).next().is_none() {
        return Err(ExtractError::NotFound {
            asset: schema.asset,
            code: code.to_string(),
        });
    }

    let mut record = AssetRecord::with_fields(schema.field_names());
    for section in schema.sections {
        read_section(&document, section, &mut record)?;
    }
    if let Some(positional) = &schema.positional {
        read_positional(&document, positional, &mut record)?;
    }
    Ok(record)
}

fn read_section(
    document: &Html,
    section: &SectionSpec,
    record: &mut AssetRecord,
) -> Result<(), ExtractError> {
    let items = selector(section.items)?;
    let value = selector(section.value)?;

    for item in document.select(&items) {
        let label = element_text(item).to_lowercase();
        let Some(spec) = section
            .fields
            .iter()
            .find(|f| label.contains(&f.matcher.to_lowercase()))
        else {
            continue;
        };
        match item.select(&value).next() {
            Some(el) => record.insert(spec.field, convert(spec.kind, &element_text(el))),
            None => debug!(field = spec.field, label = spec.label, "labeled item has no value"),
        }
    }
    Ok(())
}

fn read_positional(
    document: &Html,
    spec: &PositionalSpec,
    record: &mut AssetRecord,
) -> Result<(), ExtractError> {
    let sel = selector(spec.selector)?;
    let values: Vec<String> = document.select(&sel).map(element_text).collect();
    if values.len() < spec.fields.len() {
        return Err(ExtractError::Malformed(format!(
            "expected {} values at '{}', found {}",
            spec.fields.len(),
            spec.selector,
            values.len()
        )));
    }
    for (field, text) in spec.fields.iter().zip(&values) {
        record.insert(field, convert(spec.kind, text));
    }
    Ok(())
}

fn convert(kind: ValueKind, text: &str) -> FieldValue {
    match kind {
        ValueKind::Text => FieldValue::Text(text.to_string()),
        ValueKind::Monetary => FieldValue::number(normalize(text)),
        ValueKind::Percentage | ValueKind::Ratio => FieldValue::number(parse_percentage(text)),
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Malformed(format!("bad selector '{css}': {e}")))
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Trimmed-down copies of the asset pages' markup.

    pub fn fii_page(patrimonial_value: &str) -> String {
        format!(
            r#"<html><body>
            <section id="cards-ticker">
              <div class="_card cotacao"><div class="_card-header"><span>MXRF11 Cotação</span></div>
                <div class="_card-body"><span>R$ 10,25</span></div></div>
              <div class="_card dy"><div class="_card-header"><span>DY (12M)</span></div>
                <div class="_card-body"><span>12,45%</span></div></div>
              <div class="_card vp"><div class="_card-header"><span>P/VP</span></div>
                <div class="_card-body"><span>1,02</span></div></div>
              <div class="_card"><div class="_card-header"><span>Liquidez Diária</span></div>
                <div class="_card-body"><span>R$ 12,4 M</span></div></div>
              <div class="_card"><div class="_card-header"><span>Variação (12M)</span></div>
                <div class="_card-body"><span>-0,52%</span></div></div>
            </section>
            <div id="table-indicators">
              <div class="cell"><div class="name">Segmento</div><div class="value"> Papéis </div></div>
              <div class="cell"><div class="name">Tipo de Fundo</div><div class="value">Fundo de papel</div></div>
              <div class="cell"><div class="name">Valor Patrimonial</div><div class="value">{patrimonial_value}</div></div>
              <div class="cell"><div class="name">Vacância</div><div class="value">0,00%</div></div>
            </div>
            <div class="dy-history"><span>12,45%</span><span>11,90%</span></div>
            </body></html>"#
        )
    }

    pub fn stock_page() -> String {
        r#"<html><body>
        <section id="cards-ticker">
          <div class="_card"><div class="_card-header"><span>PETR4 Cotação</span></div>
            <div class="_card-body"><span>R$ 38,17</span></div></div>
          <div class="_card"><div class="_card-header"><span>Variação (12M)</span></div>
            <div class="_card-body"><span>4,37%</span></div></div>
          <div class="_card"><div class="_card-header"><span>P/L</span></div>
            <div class="_card-body"><span>4,12</span></div></div>
          <div class="_card"><div class="_card-header"><span>P/VP</span></div>
            <div class="_card-body"><span>1,10</span></div></div>
          <div class="_card"><div class="_card-header"><span>Liquidez Diária</span></div>
            <div class="_card-body"><span>R$ 1,5 Bilhões</span></div></div>
        </section>
        </body></html>"#
            .to_string()
    }

    pub fn missing_page() -> String {
        "<html><body><h1>Página não encontrada</h1></body></html>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::session::testing::{FakeLauncher, FakeSite};
    use std::collections::HashMap;

    fn code(raw: &str) -> AssetCode {
        AssetCode::parse(raw).unwrap()
    }

    #[test]
    fn test_fii_record_has_all_fields() {
        let schema = AssetSchema::for_asset(AssetType::Fii);
        let html = fii_page("R$ 1.234.567,89");
        let record = parse_page(schema, &code("MXRF11"), &html).unwrap();

        for field in schema.field_names() {
            assert!(record.contains(field), "missing {field}");
        }
        assert_eq!(record.text("segment"), Some("Papéis"));
        assert_eq!(record.text("type"), Some("Fundo de papel"));
        assert_eq!(record.number("patrimonialValue"), Some(1234567.89));
        assert_eq!(record.number("price"), Some(10.25));
        assert_eq!(record.number("pvp"), Some(1.02));
        assert_eq!(record.number("variation"), Some(-0.52));
        assert_eq!(record.number("dailyLiquidity"), Some(12.4e6));
        assert_eq!(record.number("currentlyYield"), Some(12.45));
        assert_eq!(record.number("averageYield"), Some(11.90));
    }

    #[test]
    fn test_stock_record() {
        let schema = AssetSchema::for_asset(AssetType::Stock);
        let record = parse_page(schema, &code("PETR4"), &stock_page()).unwrap();

        assert_eq!(record.len(), 5);
        assert_eq!(record.number("price"), Some(38.17));
        assert_eq!(record.number("variation"), Some(4.37));
        assert_eq!(record.number("pl"), Some(4.12));
        assert_eq!(record.number("pvp"), Some(1.10));
        assert_eq!(record.number("dailyLiquidity"), Some(1.5e9));
    }

    #[test]
    fn test_unparsable_value_becomes_null() {
        let schema = AssetSchema::for_asset(AssetType::Fii);
        let record = parse_page(schema, &code("MXRF11"), &fii_page("-")).unwrap();
        assert!(record.get("patrimonialValue").unwrap().is_null());
    }

    #[test]
    fn test_missing_anchor_is_not_found() {
        for asset in AssetType::ALL {
            let err = parse_page(AssetSchema::for_asset(asset), &code("XXXX11"), &missing_page())
                .unwrap_err();
            assert!(err.is_not_found(), "{asset}: {err}");
        }
    }

    #[test]
    fn test_missing_yield_history_is_malformed() {
        let html = fii_page("R$ 1,00").replace("<span>11,90%</span>", "");
        let err = parse_page(AssetSchema::for_asset(AssetType::Fii), &code("MXRF11"), &html)
            .unwrap_err();
        assert!(matches!(err, ExtractError::Malformed(_)), "{err}");
    }

    #[test]
    fn test_unmatched_fields_stay_null() {
        let html = r#"<div id="cards-ticker"><div><span>Outro</span>
            <div class="_card-body"><span>1</span></div></div></div>"#;
        let record =
            parse_page(AssetSchema::for_asset(AssetType::Stock), &code("ABCD3"), html).unwrap();
        assert_eq!(record.len(), 5);
        assert!(record.fields().all(|(_, v)| v.is_null()));
    }

    fn extractor_for(pages: HashMap<String, String>) -> (PageExtractor, Arc<SessionManager>) {
        let launcher = FakeLauncher::new(FakeSite {
            pages,
            ..FakeSite::default()
        });
        let session = Arc::new(SessionManager::new(launcher));
        let extractor = PageExtractor::new(
            Arc::clone(&session),
            "https://investidor10.com.br",
            Duration::from_secs(15),
        );
        (extractor, session)
    }

    #[tokio::test]
    async fn test_extract_through_browser_releases_page() {
        let mut pages = HashMap::new();
        pages.insert(
            "https://investidor10.com.br/fiis/mxrf11".to_string(),
            fii_page("R$ 1.234.567,89"),
        );
        pages.insert(
            "https://investidor10.com.br/stocks/xxxx3".to_string(),
            missing_page(),
        );
        let (extractor, session) = extractor_for(pages);

        let record = extractor
            .extract(AssetType::Fii, &code("MXRF11"))
            .await
            .unwrap();
        assert_eq!(record.number("patrimonialValue"), Some(1234567.89));
        assert_eq!(session.open_pages().await, 0);

        let err = extractor
            .extract(AssetType::Stock, &code("XXXX3"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(session.open_pages().await, 0);
    }

    #[tokio::test]
    async fn test_navigation_failure() {
        let (extractor, session) = extractor_for(HashMap::new());
        let err = extractor
            .extract(AssetType::Stock, &code("PETR4"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Navigation(_)), "{err}");
        assert_eq!(session.open_pages().await, 0);
    }
}
