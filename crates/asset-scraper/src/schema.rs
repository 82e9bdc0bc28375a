//! Declarative page layouts, one per asset type.
//!
//! Each schema lists where its fields live on the asset page and how their
//! text is converted. A single generic routine in [`crate::extractor`]
//! consumes these tables.

use crate::asset::AssetType;

/// How the text of a matched value is turned into a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Trimmed text, kept as-is.
    Text,
    /// Currency amount, possibly with a magnitude suffix.
    Monetary,
    /// Percentage with a trailing `%`.
    Percentage,
    /// Plain decimal ratio such as P/VP.
    Ratio,
}

/// When a page counts as ready to read after navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategy {
    /// The document's markup is parsed (`readyState` left `loading`).
    DomContentLoaded,
}

/// One labeled field inside a section.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Output field name.
    pub field: &'static str,
    /// Label as shown on the page.
    pub label: &'static str,
    /// Substring searched, case-insensitively, in the item text.
    pub matcher: &'static str,
    pub kind: ValueKind,
}

/// A group of labeled items (table cells, ticker cards).
#[derive(Debug, Clone, Copy)]
pub struct SectionSpec {
    /// Selector for each labeled item.
    pub items: &'static str,
    /// Selector for the value element, relative to the item.
    pub value: &'static str,
    pub fields: &'static [FieldSpec],
}

/// Fields read by position from a fixed sequence of elements.
#[derive(Debug, Clone, Copy)]
pub struct PositionalSpec {
    pub selector: &'static str,
    pub fields: &'static [&'static str],
    pub kind: ValueKind,
}

/// Full description of one asset page.
#[derive(Debug, Clone, Copy)]
pub struct AssetSchema {
    pub asset: AssetType,
    /// Path segment between the base URL and the code.
    pub path: &'static str,
    /// Element whose absence means the asset does not exist.
    pub anchor: &'static str,
    pub wait: WaitStrategy,
    pub sections: &'static [SectionSpec],
    pub positional: Option<PositionalSpec>,
}

impl AssetSchema {
    /// Look up the schema for an asset type.
    pub fn for_asset(asset: AssetType) -> &'static AssetSchema {
        match asset {
            AssetType::Fii => &FII_SCHEMA,
            AssetType::Stock => &STOCK_SCHEMA,
        }
    }

    /// Every field this schema produces, in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.sections
            .iter()
            .flat_map(|s| s.fields.iter().map(|f| f.field))
            .chain(self.positional.iter().flat_map(|p| p.fields.iter().copied()))
    }

    /// Page URL for a code under the given base URL.
    pub fn url(&self, base_url: &str, code: &str) -> String {
        format!("{}/{}/{}", base_url.trim_end_matches('/'), self.path, code)
    }
}

const TICKER_CARDS: &str = "#cards-ticker > div";
const CARD_VALUE: &str = "div._card-body span";

static FII_SCHEMA: AssetSchema = AssetSchema {
    asset: AssetType::Fii,
    path: "fiis",
    anchor: "#table-indicators",
    wait: WaitStrategy::DomContentLoaded,
    sections: &[
        SectionSpec {
            items: "#table-indicators div.cell",
            value: "div.value",
            fields: &[
                FieldSpec {
                    field: "segment",
                    label: "Segmento",
                    matcher: "SEGMENTO",
                    kind: ValueKind::Text,
                },
                FieldSpec {
                    field: "type",
                    label: "Tipo",
                    matcher: "TIPO DE FUNDO",
                    kind: ValueKind::Text,
                },
                FieldSpec {
                    field: "patrimonialValue",
                    label: "Valor Patrimonial",
                    matcher: "VALOR PATRIMONIAL",
                    kind: ValueKind::Monetary,
                },
            ],
        },
        SectionSpec {
            items: TICKER_CARDS,
            value: CARD_VALUE,
            fields: &[
                FieldSpec {
                    field: "pvp",
                    label: "P/VP",
                    matcher: "P/VP",
                    kind: ValueKind::Ratio,
                },
                FieldSpec {
                    field: "variation",
                    label: "Variação",
                    matcher: "VARIAÇÃO",
                    kind: ValueKind::Percentage,
                },
                FieldSpec {
                    field: "price",
                    label: "Cotação",
                    matcher: "COTAÇÃO",
                    kind: ValueKind::Monetary,
                },
                FieldSpec {
                    field: "dailyLiquidity",
                    label: "Liquidez Diária",
                    matcher: "LIQUIDEZ",
                    kind: ValueKind::Monetary,
                },
            ],
        },
    ],
    positional: Some(PositionalSpec {
        selector: "div.dy-history span",
        fields: &["currentlyYield", "averageYield"],
        kind: ValueKind::Percentage,
    }),
};

static STOCK_SCHEMA: AssetSchema = AssetSchema {
    asset: AssetType::Stock,
    path: "stocks",
    anchor: TICKER_CARDS,
    wait: WaitStrategy::DomContentLoaded,
    sections: &[SectionSpec {
        items: TICKER_CARDS,
        value: CARD_VALUE,
        fields: &[
            FieldSpec {
                field: "pl",
                label: "P/L",
                matcher: "P/L",
                kind: ValueKind::Ratio,
            },
            FieldSpec {
                field: "pvp",
                label: "P/VP",
                matcher: "P/VP",
                kind: ValueKind::Ratio,
            },
            FieldSpec {
                field: "variation",
                label: "Variação",
                matcher: "VARIAÇÃO",
                kind: ValueKind::Percentage,
            },
            FieldSpec {
                field: "price",
                label: "Cotação",
                matcher: "COTAÇÃO",
                kind: ValueKind::Monetary,
            },
            FieldSpec {
                field: "dailyLiquidity",
                label: "Liquidez Diária",
                matcher: "LIQUIDEZ",
                kind: ValueKind::Monetary,
            },
        ],
    }],
    positional: None,
};
