// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

use crate::evaluator::{Decision, Interaction};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Decisions by interaction and outcome
pub static DECISIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "gatekeeper_decisions_total",
            "Permission decisions computed, by interaction and outcome",
        ),
        &["interaction", "outcome"],
    )
    .expect("metric definition is valid");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric registers once");
    counter
});

/// Store failures surfaced to callers, by operation
pub static STORE_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "gatekeeper_store_errors_total",
            "Relation store errors surfaced to callers, by operation",
        ),
        &["operation"],
    )
    .expect("metric definition is valid");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric registers once");
    counter
});

pub fn record_decision(interaction: Interaction, decision: &Decision) {
    let outcome = match decision {
        Decision::Allowed { .. } => "allowed",
        Decision::Denied { .. } => "denied",
        Decision::AllowedWithSuppression { .. } => "suppressed",
    };
    let interaction = match interaction {
        Interaction::ViewProfile => "view_profile",
        Interaction::ViewPost => "view_post",
        Interaction::SendMessage => "send_message",
        Interaction::ViewStory => "view_story",
        Interaction::Comment => "comment",
        Interaction::SearchAppear => "search_appear",
    };
    DECISIONS_TOTAL
        .with_label_values(&[interaction, outcome])
        .inc();
}

pub fn record_store_error(operation: &str) {
    STORE_ERRORS_TOTAL.with_label_values(&[operation]).inc();
}

/// Render the registry in the Prometheus text format
pub fn gather() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if encoder.encode(&REGISTRY.gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
