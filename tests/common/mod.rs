// tests/common/mod.rs
//
// Shared fixtures: a service on the local capabilities with flat price
// history, so the technical and risk agents stay neutral and decisions move
// with the evidence only.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;

use alphastream::config::AppConfig;
use alphastream::market::{bars_from_closes, MarketSnapshot, StaticMarket};
use alphastream::{RawDocument, SignalService, SignalServiceBuilder};

pub const TICKERS: [&str; 3] = ["AAPL", "MSFT", "TSLA"];

pub fn flat_market() -> Arc<StaticMarket> {
    let m = StaticMarket::new();
    let end = NaiveDate::from_ymd_opt(2025, 1, 31).expect("date");
    for t in TICKERS {
        m.insert(MarketSnapshot {
            ticker: t.to_string(),
            bars: bars_from_closes(&[100.0; 60], end),
            insider: vec![],
        });
    }
    Arc::new(m)
}

pub fn builder(cfg: AppConfig) -> SignalServiceBuilder {
    SignalService::builder(cfg).market(flat_market())
}

pub fn started(cfg: AppConfig) -> Arc<SignalService> {
    let svc = builder(cfg).build();
    svc.start();
    svc
}

pub fn lawsuit_doc() -> RawDocument {
    RawDocument::new(
        "Apple Faces Lawsuit",
        "Major legal trouble for Apple as shareholders file a class action over iPhone disclosures.",
    )
    .with_source("wire")
}

pub fn bearish_doc() -> RawDocument {
    RawDocument::new(
        "Apple shares plunge on fraud probe",
        "Apple stock plunged after regulators alleged fraud. Analysts downgrade the shares and warn of losses from a product recall.",
    )
    .with_source("wire")
}

pub fn filler_docs() -> Vec<RawDocument> {
    let mut out = Vec::new();
    for (i, topic) in [
        "supply chain update",
        "new store opening",
        "quarterly shipment figures",
        "developer conference schedule",
        "board meeting agenda",
        "retail pricing changes",
    ]
    .iter()
    .enumerate()
    {
        out.push(RawDocument::new(
            format!("Apple {topic}"),
            format!("Apple published its {topic} number {i} for investors on Monday."),
        ));
        out.push(RawDocument::new(
            format!("Microsoft {topic}"),
            format!("Microsoft published its {topic} number {i} for investors on Tuesday."),
        ));
    }
    out
}
