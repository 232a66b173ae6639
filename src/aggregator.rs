/// Merge of per-provider results into one report
///
/// Results are first put in canonical order (by provider id) so the merged
/// report depends only on the multiset of results, never on arrival order.
/// Within a field, values that match after trimming and case-folding are
/// one candidate; the candidate with the highest confidence is canonical
/// and ties go to the candidate seen first in canonical order.
use crate::lookup::{
    AggregatedReport, Candidate, FieldValue, LookupRequest, ProviderResult, ProviderStatus,
};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

struct Group {
    normalized: String,
    value: String,
    sources: BTreeSet<String>,
    confidence: f64,
    first_seen: usize,
}

/// Merge results, stamping the report with the current time
pub fn merge(request: &LookupRequest, results: Vec<ProviderResult>) -> AggregatedReport {
    merge_at(request, results, Utc::now())
}

/// Merge results with an explicit generation time
pub fn merge_at(
    request: &LookupRequest,
    mut results: Vec<ProviderResult>,
    generated_at: DateTime<Utc>,
) -> AggregatedReport {
    results.sort_by(canonical_order);

    let partial = results.is_empty() || results.iter().any(|r| !r.is_ok());

    let providers: BTreeMap<String, ProviderStatus> = results
        .iter()
        .map(|r| (r.provider_id().to_string(), r.status()))
        .collect();

    let mut groups: BTreeMap<String, Vec<Group>> = BTreeMap::new();

    for (index, result) in results.iter().enumerate().filter(|(_, r)| r.is_ok()) {
        for (field, raw) in result.fields() {
            let value = raw.trim();
            if value.is_empty() {
                continue;
            }
            let normalized = value.to_lowercase();
            let candidates = groups.entry(field.clone()).or_default();

            match candidates.iter_mut().find(|g| g.normalized == normalized) {
                Some(group) => {
                    group.sources.insert(result.provider_id().to_string());
                    if result.confidence() > group.confidence {
                        group.confidence = result.confidence();
                        group.value = value.to_string();
                    }
                }
                None => candidates.push(Group {
                    normalized,
                    value: value.to_string(),
                    sources: BTreeSet::from([result.provider_id().to_string()]),
                    confidence: result.confidence(),
                    first_seen: index,
                }),
            }
        }
    }

    let fields = groups
        .into_iter()
        .filter_map(|(name, mut candidates)| {
            candidates.sort_by(|a, b| {
                b.confidence
                    .total_cmp(&a.confidence)
                    .then(a.first_seen.cmp(&b.first_seen))
            });

            let mut ranked = candidates.into_iter();
            let top = ranked.next()?;
            let alternatives = ranked
                .map(|g| Candidate {
                    value: g.value,
                    sources: g.sources,
                    confidence: g.confidence,
                })
                .collect();

            Some((
                name,
                FieldValue {
                    value: top.value,
                    sources: top.sources,
                    confidence: top.confidence,
                    alternatives,
                },
            ))
        })
        .collect();

    AggregatedReport {
        request_key: request.cache_key(),
        fields,
        providers,
        partial,
        generated_at,
    }
}

fn canonical_order(a: &ProviderResult, b: &ProviderResult) -> Ordering {
    a.provider_id()
        .cmp(b.provider_id())
        .then_with(|| a.status().as_str().cmp(b.status().as_str()))
        .then_with(|| b.confidence().total_cmp(&a.confidence()))
        .then_with(|| a.fields().cmp(b.fields()))
}
