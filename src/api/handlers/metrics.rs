// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use axum::response::IntoResponse;

use crate::metrics;

/// Prometheus metrics in text exposition format
pub async fn get_metrics() -> impl IntoResponse {
    metrics::gather()
}
