//! Consolidate step: fold the parallel branch outputs into one callback
//! payload per raw asset.

use std::collections::HashMap;

use propmedia_core::models::{
    BranchError, ConsolidateInput, ConsolidateOutput, JobAsset, MediaProcessingJobPayload,
    MediaProcessingJobStatus, MediaProcessingProvider,
};
use propmedia_storage::Resolution;

pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";

struct Accumulator {
    payload: MediaProcessingJobPayload,
    asset_type: String,
    best_rank: Option<u8>,
}

impl Accumulator {
    fn seed(asset: &JobAsset) -> Self {
        let mut payload = MediaProcessingJobPayload {
            raw_key: asset.key.clone(),
            ..Default::default()
        };
        if !asset.error.is_empty() {
            payload.error_code = VALIDATION_ERROR.to_string();
            payload.error_message = asset.error.clone();
        }
        Self {
            payload,
            asset_type: asset.asset_type.trim().to_lowercase(),
            best_rank: None,
        }
    }

    fn add_derivative(&mut self, derivative: &JobAsset) {
        let resolution = resolution_segment(&derivative.key);
        self.payload.outputs.insert(
            outputs_key(&resolution, &self.asset_type),
            derivative.key.clone(),
        );

        let parsed = Resolution::parse(&resolution);
        if parsed == Some(Resolution::Thumbnail) {
            self.payload.thumbnail_key = derivative.key.clone();
        }
        if let Some(rank) = parsed.map(|r| r.rank()) {
            if self.best_rank.map_or(true, |best| rank > best) {
                self.payload.processed_key = derivative.key.clone();
                self.best_rank = Some(rank);
            }
        }
    }

    fn apply_error(&mut self, error: &BranchError) {
        self.payload.error_code = error.error_code.clone();
        self.payload.error_message = error.error_message.clone();
    }
}

/// Resolution segment of a processed key: `{listing}/processed/{media}/{orientation}/{resolution}/{file}`.
/// Empty when the key does not follow that layout.
fn resolution_segment(key: &str) -> String {
    const MARKER: &str = "/processed/";
    let Some(idx) = key.to_lowercase().find(MARKER) else {
        return String::new();
    };
    let segments: Vec<&str> = key[idx + MARKER.len()..].split('/').collect();
    if segments.len() < 3 {
        return String::new();
    }
    segments[2].to_string()
}

fn outputs_key(resolution: &str, asset_type: &str) -> String {
    let resolution = match resolution.trim().to_lowercase() {
        r if r.is_empty() => Resolution::Original.as_str().to_string(),
        r => r,
    };
    let asset_type = match asset_type.trim().to_lowercase().replace(' ', "_") {
        t if t.is_empty() => "unknown".to_string(),
        t => t,
    };
    format!("{}_{}", resolution, asset_type)
}

/// Merges validation results and branch outputs into the callback body the
/// service applies. Outputs follow the order of `input.assets`.
#[tracing::instrument(skip(input), fields(job_id = input.job_id, listing_identity_id = input.listing_identity_id))]
pub fn consolidate(input: ConsolidateInput) -> ConsolidateOutput {
    let mut order = Vec::with_capacity(input.assets.len());
    let mut accumulators: HashMap<String, Accumulator> = HashMap::with_capacity(input.assets.len());
    for asset in &input.assets {
        if !accumulators.contains_key(&asset.key) {
            order.push(asset.key.clone());
        }
        accumulators.insert(asset.key.clone(), Accumulator::seed(asset));
    }

    let mut branch_errors = 0usize;
    for (index, branch) in input.parallel_results.iter().enumerate() {
        for derivative in &branch.body.generated_assets {
            match accumulators.get_mut(&derivative.source_key) {
                Some(acc) => acc.add_derivative(derivative),
                None => tracing::warn!(
                    branch_index = index,
                    source_key = %derivative.source_key,
                    generated_key = %derivative.key,
                    "Generated asset without matching source"
                ),
            }
        }

        for error in &branch.body.errors {
            if error.source_key.is_empty() {
                continue;
            }
            if let Some(acc) = accumulators.get_mut(&error.source_key) {
                acc.apply_error(error);
                branch_errors += 1;
            }
        }
    }

    let outputs: Vec<MediaProcessingJobPayload> = order
        .iter()
        .filter_map(|key| accumulators.remove(key))
        .map(|acc| acc.payload)
        .collect();

    if branch_errors > 0 {
        tracing::warn!(branch_errors, "Derivative errors attached to outputs");
    }
    tracing::info!(output_items = outputs.len(), "Consolidation complete");

    ConsolidateOutput {
        job_id: input.job_id,
        listing_identity_id: input.listing_identity_id,
        execution_arn: input.execution_arn,
        started_at: input.started_at,
        provider: MediaProcessingProvider::StepFunctions,
        status: MediaProcessingJobStatus::Succeeded,
        outputs,
        traceparent: input.traceparent,
    }
}
