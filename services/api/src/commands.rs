use crate::infra::{load_store, matching_service};
use clap::Args;
use donor_match::config::{AppConfig, MatchingSettings};
use donor_match::error::AppError;
use donor_match::matching::{BatchSummary, CandidateView, OperatorCredential, RecipientId};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub(crate) struct BatchArgs {
    /// Donor roster CSV
    #[arg(long)]
    pub(crate) donors: PathBuf,
    /// Recipient roster CSV
    #[arg(long)]
    pub(crate) recipients: PathBuf,
    /// Operator token; must match MATCH_OPERATOR_TOKEN
    #[arg(long)]
    pub(crate) token: Option<String>,
    /// Name recorded in the audit trail
    #[arg(long, default_value = "cli")]
    pub(crate) operator: String,
}

#[derive(Args, Debug)]
pub(crate) struct CandidatesArgs {
    /// Donor roster CSV
    #[arg(long)]
    pub(crate) donors: PathBuf,
    /// Recipient roster CSV
    #[arg(long)]
    pub(crate) recipients: PathBuf,
    /// Recipient request identifier
    #[arg(long)]
    pub(crate) recipient: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CandidatePreview {
    pub(crate) recipient_id: RecipientId,
    pub(crate) candidates: Vec<CandidateView>,
}

pub(crate) fn run_batch(args: BatchArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let summary = execute_batch(args, &config.matching)?;
    print_json(&summary)
}

pub(crate) fn run_candidates(args: CandidatesArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let preview = execute_candidates(args, &config.matching)?;
    print_json(&preview)
}

pub(crate) fn execute_batch(
    args: BatchArgs,
    settings: &MatchingSettings,
) -> Result<BatchSummary, AppError> {
    let store = load_store(Some(&args.donors), Some(&args.recipients))?;
    let service = matching_service(store, settings);
    let credential = OperatorCredential {
        operator: args.operator,
        token: args.token.unwrap_or_default(),
    };
    Ok(service.run_batch_allocation(&credential)?)
}

pub(crate) fn execute_candidates(
    args: CandidatesArgs,
    settings: &MatchingSettings,
) -> Result<CandidatePreview, AppError> {
    let store = load_store(Some(&args.donors), Some(&args.recipients))?;
    let service = matching_service(store, settings);
    let recipient_id = RecipientId(args.recipient);
    let candidates = service
        .find_candidates(&recipient_id)?
        .iter()
        .map(|candidate| candidate.view())
        .collect();

    Ok(CandidatePreview {
        recipient_id,
        candidates,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered =
        serde_json::to_string_pretty(value).map_err(|err| AppError::Io(err.into()))?;
    println!("{rendered}");
    Ok(())
}
