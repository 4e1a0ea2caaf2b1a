//! On-chain mirror of the election data, served from the voting contract.

use axum::{
    debug_handler,
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{auth::{AdminUser, CurrentUser}, AppError, AppJson, AppResult, AppState};

pub mod abi;
pub mod contract;
pub mod rpc;

pub use contract::{ChainCandidate, ChainElection, VoterStatus, VotingContract};

pub const NOT_CONFIGURED: &str = "Smart contract not configured";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chain/status", get(status))
        .route("/chain/elections", get(elections))
        .route("/chain/elections/{id}/candidates", get(candidates))
        .route("/chain/elections/{id}/votes", post(cast_vote))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/chain/elections", post(create_election))
        .route("/chain/elections/{id}/candidates", post(add_candidate))
        .route("/chain/voters", post(verify_voter))
}

fn configured(contract: Option<VotingContract>) -> AppResult<VotingContract> {
    contract.ok_or_else(|| AppError::Unavailable(NOT_CONFIGURED.to_owned()))
}

#[derive(Debug, Serialize)]
pub struct ChainStatus {
    pub chain_id: u64,
    pub network_name: String,
    pub contract_address: String,
    pub admin: String,
    pub election_count: u64,
    pub accounts: Vec<String>,
}

#[debug_handler(state = AppState)]
pub async fn status(State(contract): State<Option<VotingContract>>) -> AppResult<Json<ChainStatus>> {
    let contract = configured(contract)?;
    let chain_id = contract.ensure_network().await?;

    Ok(Json(ChainStatus {
        chain_id,
        network_name: contract.chain().network_name.clone(),
        contract_address: contract.address().to_owned(),
        admin: contract.admin().await?,
        election_count: contract.election_count().await?,
        accounts: contract.accounts().await?,
    }))
}

#[debug_handler(state = AppState)]
pub async fn elections(State(contract): State<Option<VotingContract>>) -> AppResult<Json<Vec<ChainElection>>> {
    Ok(Json(configured(contract)?.elections().await?))
}

#[debug_handler(state = AppState)]
pub async fn candidates(
    State(contract): State<Option<VotingContract>>,
    Path(election_id): Path<u64>,
) -> AppResult<Json<Vec<ChainCandidate>>> {
    let contract = configured(contract)?;
    contract.election(election_id).await?.ok_or(AppError::NotFound("election"))?;
    Ok(Json(contract.candidates(election_id).await?))
}

#[derive(Deserialize)]
pub(crate) struct VoteBody {
    from: String,
    candidate_id: u64,
}

#[derive(Debug, Serialize)]
pub struct Transaction {
    pub transaction_hash: String,
    pub block_number: u64,
}

#[debug_handler(state = AppState)]
pub async fn cast_vote(
    State(contract): State<Option<VotingContract>>,
    user: CurrentUser,
    Path(election_id): Path<u64>,
    AppJson(VoteBody { from, candidate_id }): AppJson<VoteBody>,
) -> AppResult<Json<Transaction>> {
    let contract = configured(contract)?;

    let election = contract.election(election_id).await?.ok_or(AppError::NotFound("election"))?;
    if election.status != "active" {
        return Err("This election is not open for voting")?;
    }
    if !contract.voter_status(&from).await?.verified {
        return Err("Wallet is not a verified voter")?;
    }
    if contract.has_voted(election_id, &from).await? {
        return Err(AppError::Conflict(crate::elections::votes::ALREADY_VOTED.to_owned()));
    }

    let hash = contract.cast_vote(&from, election_id, candidate_id).await?;
    let receipt = contract.wait_for_receipt(&hash).await?;
    tracing::info!(user_id = %user.id, election_id, block = receipt.block_number, "on-chain ballot mined");

    Ok(Json(Transaction { transaction_hash: receipt.transaction_hash, block_number: receipt.block_number }))
}

async fn require_contract_admin(contract: &VotingContract, from: &str) -> AppResult<()> {
    if contract.is_admin(from).await? {
        Ok(())
    } else {
        Err(AppError::Rejected("Only the contract admin can do this".to_owned()))
    }
}

#[derive(Deserialize)]
pub(crate) struct NewChainElection {
    from: String,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    election_type: String,
    start_date: u64,
    end_date: u64,
}

#[debug_handler(state = AppState)]
pub async fn create_election(
    State(contract): State<Option<VotingContract>>,
    _admin: AdminUser,
    AppJson(body): AppJson<NewChainElection>,
) -> AppResult<Json<Transaction>> {
    let contract = configured(contract)?;
    if body.title.trim().is_empty() {
        return Err("Title is required")?;
    }
    if body.end_date <= body.start_date {
        return Err("End date must be after start date")?;
    }
    require_contract_admin(&contract, &body.from).await?;

    let hash = contract.create_election(
        &body.from,
        body.title.trim(),
        &body.description,
        &body.election_type,
        body.start_date,
        body.end_date,
    ).await?;
    let receipt = contract.wait_for_receipt(&hash).await?;

    Ok(Json(Transaction { transaction_hash: receipt.transaction_hash, block_number: receipt.block_number }))
}

#[derive(Deserialize)]
pub(crate) struct NewChainCandidate {
    from: String,
    name: String,
    #[serde(default)]
    party: String,
    #[serde(default)]
    bio: String,
    #[serde(default)]
    image_url: String,
}

#[debug_handler(state = AppState)]
pub async fn add_candidate(
    State(contract): State<Option<VotingContract>>,
    _admin: AdminUser,
    Path(election_id): Path<u64>,
    AppJson(body): AppJson<NewChainCandidate>,
) -> AppResult<Json<Transaction>> {
    let contract = configured(contract)?;
    if body.name.trim().is_empty() {
        return Err("Name is required")?;
    }
    require_contract_admin(&contract, &body.from).await?;

    let hash = contract.add_candidate(
        &body.from,
        election_id,
        body.name.trim(),
        &body.party,
        &body.bio,
        &body.image_url,
    ).await?;
    let receipt = contract.wait_for_receipt(&hash).await?;

    Ok(Json(Transaction { transaction_hash: receipt.transaction_hash, block_number: receipt.block_number }))
}

#[derive(Deserialize)]
pub(crate) struct VoterBody {
    from: String,
    voter_address: String,
    voter_id: String,
}

#[debug_handler(state = AppState)]
pub async fn verify_voter(
    State(contract): State<Option<VotingContract>>,
    _admin: AdminUser,
    AppJson(VoterBody { from, voter_address, voter_id }): AppJson<VoterBody>,
) -> AppResult<Json<Transaction>> {
    let contract = configured(contract)?;
    if voter_id.trim().is_empty() {
        return Err("Voter ID is required")?;
    }
    require_contract_admin(&contract, &from).await?;

    let hash = contract.verify_voter(&from, &voter_address, voter_id.trim()).await?;
    let receipt = contract.wait_for_receipt(&hash).await?;

    Ok(Json(Transaction { transaction_hash: receipt.transaction_hash, block_number: receipt.block_number }))
}
