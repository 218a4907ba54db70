// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::app::errors::{AppError, AppResult};
use crate::app::types::MethodType;

pub const DEFAULT_GENETIC_CODE: &str = "Universal";
pub const DEFAULT_CI: &str = "No";
pub const DEFAULT_SRV: &str = "Yes";
pub const DEFAULT_MULTIPLE_HITS: &str = "None";
pub const DEFAULT_SITE_MULTIHIT: &str = "Estimate";

/// Normalized analysis parameters. `None` means "not supplied by the caller",
/// which is distinct from a supplied zero or empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub alignment: Option<String>,
    pub tree: Option<String>,
    pub genetic_code: Option<String>,
    pub branches: Option<Vec<String>>,
    pub ci: Option<String>,
    pub srv: Option<String>,
    pub resample: Option<u32>,
    pub multiple_hits: Option<String>,
    pub site_multihit: Option<String>,
    pub rates: Option<u32>,
    pub syn_rates: Option<u32>,
    pub grid_size: Option<u32>,
    pub starting_points: Option<u32>,
    pub error_sink: Option<bool>,
}

impl AnalysisRequest {
    pub fn alignment(&self) -> &str {
        self.alignment.as_deref().unwrap_or_default()
    }

    pub fn is_alignment_set(&self) -> bool {
        self.alignment.as_deref().is_some_and(|a| !a.is_empty())
    }

    pub fn tree(&self) -> &str {
        self.tree.as_deref().unwrap_or_default()
    }

    pub fn is_tree_set(&self) -> bool {
        self.tree.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn genetic_code(&self) -> &str {
        self.genetic_code.as_deref().unwrap_or(DEFAULT_GENETIC_CODE)
    }

    pub fn is_genetic_code_set(&self) -> bool {
        self.genetic_code.is_some()
    }

    pub fn branches(&self) -> &[String] {
        self.branches.as_deref().unwrap_or_default()
    }

    pub fn is_branches_set(&self) -> bool {
        self.branches.is_some()
    }

    pub fn ci(&self) -> &str {
        self.ci.as_deref().unwrap_or(DEFAULT_CI)
    }

    pub fn is_ci_set(&self) -> bool {
        self.ci.is_some()
    }

    pub fn srv(&self) -> &str {
        self.srv.as_deref().unwrap_or(DEFAULT_SRV)
    }

    pub fn is_srv_set(&self) -> bool {
        self.srv.is_some()
    }

    pub fn resample(&self) -> u32 {
        self.resample.unwrap_or_default()
    }

    pub fn is_resample_set(&self) -> bool {
        self.resample.is_some()
    }

    pub fn multiple_hits(&self) -> &str {
        self.multiple_hits.as_deref().unwrap_or(DEFAULT_MULTIPLE_HITS)
    }

    pub fn is_multiple_hits_set(&self) -> bool {
        self.multiple_hits.is_some()
    }

    pub fn site_multihit(&self) -> &str {
        self.site_multihit.as_deref().unwrap_or(DEFAULT_SITE_MULTIHIT)
    }

    pub fn is_site_multihit_set(&self) -> bool {
        self.site_multihit.is_some()
    }

    pub fn rates(&self) -> u32 {
        self.rates.unwrap_or_default()
    }

    pub fn is_rates_set(&self) -> bool {
        self.rates.is_some()
    }

    pub fn syn_rates(&self) -> u32 {
        self.syn_rates.unwrap_or_default()
    }

    pub fn is_syn_rates_set(&self) -> bool {
        self.syn_rates.is_some()
    }

    pub fn grid_size(&self) -> u32 {
        self.grid_size.unwrap_or_default()
    }

    pub fn is_grid_size_set(&self) -> bool {
        self.grid_size.is_some()
    }

    pub fn starting_points(&self) -> u32 {
        self.starting_points.unwrap_or_default()
    }

    pub fn is_starting_points_set(&self) -> bool {
        self.starting_points.is_some()
    }

    pub fn error_sink(&self) -> bool {
        self.error_sink.unwrap_or_default()
    }

    pub fn is_error_sink_set(&self) -> bool {
        self.error_sink.is_some()
    }
}

/// Conversion from a concrete request shape into `AnalysisRequest`.
pub trait AdaptRequest {
    fn adapt(self, method: MethodType) -> AppResult<AnalysisRequest>;
}

impl AdaptRequest for AnalysisRequest {
    fn adapt(self, _method: MethodType) -> AppResult<AnalysisRequest> {
        Ok(self)
    }
}

/// Maps a boolean option into the `"Yes"`/`"No"` string domain.
pub fn yes_no(value: bool) -> String {
    let token = if value { "Yes" } else { "No" };
    token.to_string()
}

/// Canonicalizes the casing of yes/no strings; other values pass through.
pub fn normalize_tri_state(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("yes") || trimmed.eq_ignore_ascii_case("true") {
        "Yes".to_string()
    } else if trimmed.eq_ignore_ascii_case("no") || trimmed.eq_ignore_ascii_case("false") {
        "No".to_string()
    } else {
        trimmed.to_string()
    }
}

fn required_alignment(alignment: String, method: MethodType) -> AppResult<Option<String>> {
    if alignment.trim().is_empty() {
        return Err(AppError::adaptation(format!(
            "{method} request requires a non-empty alignment"
        )));
    }
    Ok(Some(alignment))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FelRequest {
    pub alignment: String,
    pub tree: Option<String>,
    pub genetic_code: Option<String>,
    pub branches: Option<Vec<String>>,
    pub ci: Option<bool>,
    pub srv: Option<bool>,
    pub resample: Option<u32>,
    pub multiple_hits: Option<String>,
    pub site_multihit: Option<String>,
}

impl AdaptRequest for FelRequest {
    fn adapt(self, method: MethodType) -> AppResult<AnalysisRequest> {
        Ok(AnalysisRequest {
            alignment: required_alignment(self.alignment, method)?,
            tree: non_empty(self.tree),
            genetic_code: self.genetic_code,
            branches: self.branches,
            ci: self.ci.map(yes_no),
            srv: self.srv.map(yes_no),
            resample: self.resample,
            multiple_hits: self.multiple_hits,
            site_multihit: self.site_multihit,
            ..AnalysisRequest::default()
        })
    }
}

/// Shape shared by BUSTED and RELAX style requests. `srv` arrives as a
/// tri-state string here rather than a boolean.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BustedRequest {
    pub alignment: String,
    pub tree: Option<String>,
    pub genetic_code: Option<String>,
    pub branches: Option<Vec<String>>,
    pub srv: Option<String>,
    pub multiple_hits: Option<String>,
    pub rates: Option<u32>,
    pub syn_rates: Option<u32>,
    pub grid_size: Option<u32>,
    pub starting_points: Option<u32>,
    pub error_sink: Option<bool>,
}

impl AdaptRequest for BustedRequest {
    fn adapt(self, method: MethodType) -> AppResult<AnalysisRequest> {
        Ok(AnalysisRequest {
            alignment: required_alignment(self.alignment, method)?,
            tree: non_empty(self.tree),
            genetic_code: self.genetic_code,
            branches: self.branches,
            srv: self.srv.as_deref().map(normalize_tri_state),
            multiple_hits: self.multiple_hits,
            rates: self.rates,
            syn_rates: self.syn_rates,
            grid_size: self.grid_size,
            starting_points: self.starting_points,
            error_sink: self.error_sink,
            ..AnalysisRequest::default()
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemeRequest {
    pub alignment: String,
    pub tree: Option<String>,
    pub genetic_code: Option<String>,
    pub branches: Option<Vec<String>>,
    pub resample: Option<u32>,
    pub rates: Option<u32>,
    pub multiple_hits: Option<String>,
    pub site_multihit: Option<String>,
}

impl AdaptRequest for MemeRequest {
    fn adapt(self, method: MethodType) -> AppResult<AnalysisRequest> {
        Ok(AnalysisRequest {
            alignment: required_alignment(self.alignment, method)?,
            tree: non_empty(self.tree),
            genetic_code: self.genetic_code,
            branches: self.branches,
            resample: self.resample,
            rates: self.rates,
            multiple_hits: self.multiple_hits,
            site_multihit: self.site_multihit,
            ..AnalysisRequest::default()
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TreeStatsRequest {
    pub tree: String,
}

impl AdaptRequest for TreeStatsRequest {
    fn adapt(self, method: MethodType) -> AppResult<AnalysisRequest> {
        if self.tree.trim().is_empty() {
            return Err(AppError::adaptation(format!(
                "{method} request requires a non-empty tree"
            )));
        }
        Ok(AnalysisRequest {
            tree: Some(self.tree),
            ..AnalysisRequest::default()
        })
    }
}

/// Best-effort adaptation of arbitrary JSON. Each field is extracted on its
/// own: a wrong type leaves it unset rather than failing the request.
/// Numbers have no presence source here, so only non-zero counts as set.
impl AdaptRequest for Value {
    fn adapt(self, method: MethodType) -> AppResult<AnalysisRequest> {
        let Value::Object(map) = self else {
            return Err(AppError::adaptation("request must be a JSON object"));
        };

        let alignment = match map.get("alignment") {
            Some(Value::String(a)) if !a.trim().is_empty() => Some(a.clone()),
            _ if !method.requires_alignment() => None,
            Some(Value::String(_)) => {
                return Err(AppError::adaptation(format!(
                    "{method} request has an empty alignment"
                )));
            }
            _ => {
                return Err(AppError::adaptation(format!(
                    "{method} request lacks a string alignment"
                )));
            }
        };

        let string = |key: &str| match map.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        };
        let number = |key: &str| {
            map.get(key)
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n != 0)
        };
        let tri_state = |key: &str| match map.get(key) {
            Some(Value::Bool(b)) => Some(yes_no(*b)),
            Some(Value::String(s)) => Some(normalize_tri_state(s)),
            _ => None,
        };
        let branches = match map.get("branches") {
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
            ),
            Some(Value::String(s)) => Some(vec![s.clone()]),
            _ => None,
        };

        let request = AnalysisRequest {
            alignment,
            tree: non_empty(string("tree")),
            genetic_code: string("genetic_code"),
            branches,
            ci: tri_state("ci"),
            srv: tri_state("srv"),
            resample: number("resample"),
            multiple_hits: string("multiple_hits"),
            site_multihit: string("site_multihit"),
            rates: number("rates"),
            syn_rates: number("syn_rates"),
            grid_size: number("grid_size"),
            starting_points: number("starting_points"),
            error_sink: map.get("error_sink").and_then(Value::as_bool),
        };

        if !method.requires_alignment() && !request.is_tree_set() {
            return Err(AppError::adaptation(format!(
                "{method} request requires a non-empty tree"
            )));
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::app::errors::AppErrorKind;

    #[test]
    fn adapting_a_request_is_identity() {
        let request = AnalysisRequest {
            alignment: Some("x.fas".into()),
            resample: Some(0),
            ..AnalysisRequest::default()
        };
        let adapted = request.clone().adapt(MethodType::Fel).unwrap();
        assert_eq!(adapted, request);
    }

    #[test]
    fn accessors_return_defaults_when_unset() {
        let request = AnalysisRequest::default();
        assert_eq!(request.alignment(), "");
        assert_eq!(request.genetic_code(), DEFAULT_GENETIC_CODE);
        assert_eq!(request.ci(), "No");
        assert_eq!(request.srv(), "Yes");
        assert_eq!(request.resample(), 0);
        assert!(!request.is_resample_set());
        assert!(!request.is_ci_set());
        assert!(request.branches().is_empty());
    }

    #[test]
    fn typed_variant_keeps_explicit_zero_as_set() {
        let fel = FelRequest {
            alignment: "x.fas".into(),
            resample: Some(0),
            ci: Some(true),
            srv: Some(false),
            ..FelRequest::default()
        };
        let request = fel.adapt(MethodType::Fel).unwrap();
        assert!(request.is_resample_set());
        assert_eq!(request.resample(), 0);
        assert_eq!(request.ci(), "Yes");
        assert_eq!(request.srv(), "No");
        assert!(!request.is_multiple_hits_set());
        assert_eq!(request.multiple_hits(), DEFAULT_MULTIPLE_HITS);
    }

    #[test]
    fn typed_variant_rejects_empty_alignment() {
        let err = FelRequest::default().adapt(MethodType::Fel).unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::Adaptation);
        assert!(err.message().contains("alignment"));
    }

    #[test]
    fn busted_tri_state_srv_is_normalized() {
        let busted = BustedRequest {
            alignment: "x.fas".into(),
            srv: Some("yes".into()),
            error_sink: Some(true),
            ..BustedRequest::default()
        };
        let request = busted.adapt(MethodType::Busted).unwrap();
        assert_eq!(request.srv(), "Yes");
        assert!(request.error_sink());

        let other = BustedRequest {
            alignment: "x.fas".into(),
            srv: Some("Branch-site".into()),
            ..BustedRequest::default()
        };
        assert_eq!(other.adapt(MethodType::Busted).unwrap().srv(), "Branch-site");
    }

    #[test]
    fn json_numbers_use_non_zero_presence() {
        let value = json!({
            "alignment": "x.fas",
            "resample": 0,
            "rates": 3,
            "grid_size": "20",
        });
        let request = value.adapt(MethodType::Meme).unwrap();
        assert!(!request.is_resample_set());
        assert!(request.is_rates_set());
        assert_eq!(request.rates(), 3);
        // wrong type is unset, not an error
        assert!(!request.is_grid_size_set());
    }

    #[test]
    fn json_booleans_and_strings_share_the_yes_no_domain() {
        let request = json!({"alignment": "x.fas", "ci": true, "srv": "no"})
            .adapt(MethodType::Fel)
            .unwrap();
        assert_eq!(request.ci(), "Yes");
        assert_eq!(request.srv(), "No");
    }

    #[test]
    fn json_alignment_must_be_a_non_empty_string() {
        let missing = json!({"tree": "t.nwk"}).adapt(MethodType::Fel).unwrap_err();
        assert_eq!(missing.kind(), AppErrorKind::Adaptation);

        let wrong_type = json!({"alignment": 7}).adapt(MethodType::Fel).unwrap_err();
        assert_eq!(wrong_type.kind(), AppErrorKind::Adaptation);

        let empty = json!({"alignment": ""}).adapt(MethodType::Fel).unwrap_err();
        assert_eq!(empty.kind(), AppErrorKind::Adaptation);
        assert_ne!(missing.message(), empty.message());

        let not_object = json!(["x.fas"]).adapt(MethodType::Fel).unwrap_err();
        assert_eq!(not_object.kind(), AppErrorKind::Adaptation);
    }

    #[test]
    fn tree_only_method_accepts_missing_alignment() {
        let request = json!({"tree": "t.nwk"})
            .adapt(MethodType::TreeStats)
            .unwrap();
        assert!(!request.is_alignment_set());
        assert_eq!(request.tree(), "t.nwk");

        let err = json!({}).adapt(MethodType::TreeStats).unwrap_err();
        assert!(err.message().contains("tree"));

        let typed = TreeStatsRequest { tree: "t.nwk".into() }
            .adapt(MethodType::TreeStats)
            .unwrap();
        assert!(typed.is_tree_set());
    }

    #[test]
    fn json_branches_accept_string_or_array() {
        let single = json!({"alignment": "x.fas", "branches": "Foreground"})
            .adapt(MethodType::Absrel)
            .unwrap();
        assert_eq!(single.branches(), ["Foreground".to_string()]);

        let many = json!({"alignment": "x.fas", "branches": ["a", 1, "b"]})
            .adapt(MethodType::Absrel)
            .unwrap();
        assert_eq!(many.branches(), ["a".to_string(), "b".to_string()]);
    }
}
