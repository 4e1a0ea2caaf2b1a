use std::time::Duration;

use serde::Serialize;

use crate::{config::ChainConfig, AppError, AppResult};

use super::{
    abi::{call_data, parse_address, Decoder, Token},
    rpc::{Receipt, RpcClient},
};

const RECEIPT_POLL: Duration = Duration::from_millis(500);
const RECEIPT_ATTEMPTS: u32 = 120;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainElection {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub election_type: String,
    pub start_date: u64,
    pub end_date: u64,
    pub status: String,
    pub total_votes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainCandidate {
    pub id: u64,
    pub election_id: u64,
    pub name: String,
    pub party: String,
    pub bio: String,
    pub image_url: String,
    pub vote_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoterStatus {
    pub verified: bool,
    pub voter_id: String,
}

/// Typed calls against the deployed voting contract.
#[derive(Clone)]
pub struct VotingContract {
    rpc: RpcClient,
    address: String,
    chain: ChainConfig,
}

impl VotingContract {
    /// `None` when no contract address is configured.
    pub fn from_config(chain: &ChainConfig) -> anyhow::Result<Option<Self>> {
        let Some(address) = chain.contract_address.as_deref() else {
            return Ok(None);
        };
        parse_address(address)?;

        Ok(Some(Self {
            rpc: RpcClient::new(chain.rpc_url.clone()),
            address: address.to_lowercase(),
            chain: chain.clone(),
        }))
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn chain(&self) -> &ChainConfig {
        &self.chain
    }

    /// Fails unless the node is on the configured chain, asking it to switch first.
    pub async fn ensure_network(&self) -> AppResult<u64> {
        let chain_id = self.rpc.chain_id().await?;
        if chain_id == self.chain.chain_id {
            return Ok(chain_id);
        }

        tracing::info!(connected = chain_id, expected = self.chain.chain_id, "switching network");
        if let Err(err) = self.rpc.switch_network(self.chain.chain_id, &self.chain.network_name, &self.chain.rpc_url).await {
            tracing::warn!("network switch failed: {err}");
        }
        match self.rpc.chain_id().await? {
            id if id == self.chain.chain_id => Ok(id),
            id => Err(AppError::Unavailable(format!(
                "Wrong network: connected to chain {id}, expected {} ({})",
                self.chain.chain_id, self.chain.network_name,
            ))),
        }
    }

    async fn call(&self, signature: &str, args: &[Token]) -> AppResult<Vec<u8>> {
        Ok(self.rpc.call(&self.address, &call_data(signature, args)).await?)
    }

    /// Accounts the node can sign for; candidates for `from` in writes.
    pub async fn accounts(&self) -> AppResult<Vec<String>> {
        Ok(self.rpc.accounts().await?)
    }

    pub async fn admin(&self) -> AppResult<String> {
        let data = self.call("admin()", &[]).await?;
        Ok(Decoder::new(&data).address()?)
    }

    pub async fn is_admin(&self, address: &str) -> AppResult<bool> {
        Ok(self.admin().await?.eq_ignore_ascii_case(address))
    }

    pub async fn voter_status(&self, address: &str) -> AppResult<VoterStatus> {
        let data = self.call("getVoterStatus(address)", &[address_token(address)?]).await?;
        let mut decoder = Decoder::new(&data);
        Ok(VoterStatus { verified: decoder.bool()?, voter_id: decoder.string()? })
    }

    pub async fn election_count(&self) -> AppResult<u64> {
        let data = self.call("electionCount()", &[]).await?;
        Ok(Decoder::new(&data).u64()?)
    }

    /// `None` for ids the contract reports as nonexistent.
    pub async fn election(&self, id: u64) -> AppResult<Option<ChainElection>> {
        let data = self.call("getElection(uint256)", &[Token::Uint(id.into())]).await?;
        let mut decoder = Decoder::new(&data);
        let id = decoder.u64()?;
        let title = decoder.string()?;
        let description = decoder.string()?;
        let election_type = decoder.string()?;
        let start_date = decoder.u64()?;
        let end_date = decoder.u64()?;
        if !decoder.bool()? {
            return Ok(None);
        }

        Ok(Some(ChainElection {
            id,
            title,
            description,
            election_type,
            start_date,
            end_date,
            status: self.election_status(id).await?,
            total_votes: self.total_votes(id).await?,
        }))
    }

    pub async fn elections(&self) -> AppResult<Vec<ChainElection>> {
        let mut elections = Vec::new();
        for id in 1..=self.election_count().await? {
            if let Some(election) = self.election(id).await? {
                elections.push(election);
            }
        }
        Ok(elections)
    }

    pub async fn election_status(&self, id: u64) -> AppResult<String> {
        let data = self.call("getElectionStatus(uint256)", &[Token::Uint(id.into())]).await?;
        Ok(Decoder::new(&data).string()?)
    }

    pub async fn candidate_ids(&self, election_id: u64) -> AppResult<Vec<u64>> {
        let data = self.call("getElectionCandidateIds(uint256)", &[Token::Uint(election_id.into())]).await?;
        Decoder::new(&data)
            .uint_array()?
            .into_iter()
            .map(|id| u64::try_from(id).map_err(|_| AppError::Internal(anyhow::anyhow!("candidate id {id} out of range"))))
            .collect()
    }

    pub async fn candidate(&self, id: u64) -> AppResult<ChainCandidate> {
        let data = self.call("getCandidate(uint256)", &[Token::Uint(id.into())]).await?;
        let mut decoder = Decoder::new(&data);
        Ok(ChainCandidate {
            id: decoder.u64()?,
            election_id: decoder.u64()?,
            name: decoder.string()?,
            party: decoder.string()?,
            bio: decoder.string()?,
            image_url: decoder.string()?,
            vote_count: decoder.u64()?,
        })
    }

    pub async fn candidates(&self, election_id: u64) -> AppResult<Vec<ChainCandidate>> {
        let mut candidates = Vec::new();
        for id in self.candidate_ids(election_id).await? {
            candidates.push(self.candidate(id).await?);
        }
        Ok(candidates)
    }

    pub async fn has_voted(&self, election_id: u64, address: &str) -> AppResult<bool> {
        let data = self.call(
            "hasVotedInElection(uint256,address)",
            &[Token::Uint(election_id.into()), address_token(address)?],
        ).await?;
        Ok(Decoder::new(&data).bool()?)
    }

    pub async fn total_votes(&self, election_id: u64) -> AppResult<u64> {
        let data = self.call("getTotalVotesForElection(uint256)", &[Token::Uint(election_id.into())]).await?;
        Ok(Decoder::new(&data).u64()?)
    }

    async fn transact(&self, from: &str, signature: &str, args: &[Token]) -> AppResult<String> {
        self.ensure_network().await?;
        parse_address(from).map_err(|e| AppError::Rejected(e.to_string()))?;

        let hash = self.rpc.send_transaction(from, &self.address, &call_data(signature, args)).await?;
        tracing::info!(%signature, %hash, "transaction sent");
        Ok(hash)
    }

    pub async fn create_election(
        &self,
        from: &str,
        title: &str,
        description: &str,
        election_type: &str,
        start_date: u64,
        end_date: u64,
    ) -> AppResult<String> {
        self.transact(from, "createElection(string,string,string,uint256,uint256)", &[
            Token::String(title.to_owned()),
            Token::String(description.to_owned()),
            Token::String(election_type.to_owned()),
            Token::Uint(start_date.into()),
            Token::Uint(end_date.into()),
        ]).await
    }

    pub async fn add_candidate(
        &self,
        from: &str,
        election_id: u64,
        name: &str,
        party: &str,
        bio: &str,
        image_url: &str,
    ) -> AppResult<String> {
        self.transact(from, "addCandidate(uint256,string,string,string,string)", &[
            Token::Uint(election_id.into()),
            Token::String(name.to_owned()),
            Token::String(party.to_owned()),
            Token::String(bio.to_owned()),
            Token::String(image_url.to_owned()),
        ]).await
    }

    pub async fn verify_voter(&self, from: &str, voter_address: &str, voter_id: &str) -> AppResult<String> {
        self.transact(from, "verifyVoter(address,string)", &[
            address_token(voter_address)?,
            Token::String(voter_id.to_owned()),
        ]).await
    }

    pub async fn cast_vote(&self, from: &str, election_id: u64, candidate_id: u64) -> AppResult<String> {
        self.transact(from, "castVote(uint256,uint256)", &[
            Token::Uint(election_id.into()),
            Token::Uint(candidate_id.into()),
        ]).await
    }

    /// Polls until the transaction is mined. A reverted transaction is an error.
    pub async fn wait_for_receipt(&self, hash: &str) -> AppResult<Receipt> {
        for _ in 0..RECEIPT_ATTEMPTS {
            if let Some(receipt) = self.rpc.transaction_receipt(hash).await? {
                if !receipt.success {
                    return Err(AppError::Rejected(format!("Transaction {hash} reverted")));
                }
                return Ok(receipt);
            }
            tokio::time::sleep(RECEIPT_POLL).await;
        }
        Err(AppError::Unavailable(format!("Transaction {hash} was not mined in time")))
    }
}

fn address_token(address: &str) -> AppResult<Token> {
    parse_address(address)
        .map(Token::Address)
        .map_err(|e| AppError::Rejected(e.to_string()))
}
