use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use solana_sdk::{instruction::Instruction, pubkey::Pubkey};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::agent::calculator::{estimate_withdraw, slippage_floor};
use crate::agent::types::{AgentError, FixedSide, LiquidityAmounts, PoolReserves};
use crate::onchain_instance::instructions::{AMM_V4_PROGRAM_ID, AmmPoolKeys, build_deposit, build_withdraw};
use crate::services::chain_rpc::ChainRpc;

#[derive(Debug, Clone, PartialEq)]
pub struct TokenInfo {
    pub mint: Pubkey,
    pub symbol: String,
    pub decimals: u8,
}

/// A pool as listed by the AMM registry.
#[derive(Debug, Clone, PartialEq)]
pub struct AmmPool {
    pub id: String,
    pub program_id: Pubkey,
    pub mint_a: TokenInfo,
    pub mint_b: TokenInfo,
    pub lp_mint: Pubkey,
    pub lp_decimals: u8,
}

impl AmmPool {
    pub fn contains_mint(&self, mint: &Pubkey) -> bool {
        self.mint_a.mint == *mint || self.mint_b.mint == *mint
    }

    /// Which side of the pool `mint` sits on.
    pub fn side_of(&self, mint: &Pubkey) -> Option<FixedSide> {
        if self.mint_a.mint == *mint {
            Some(FixedSide::Base)
        } else if self.mint_b.mint == *mint {
            Some(FixedSide::Quote)
        } else {
            None
        }
    }
}

/// Pool registry plus liquidity instruction builders for one AMM venue.
#[async_trait]
pub trait AmmVenue: Send + Sync {
    async fn pool_by_id(&self, pool_id: &str) -> Result<Option<AmmPool>, AgentError>;

    async fn pool_by_mints(&self, mint_a: &Pubkey, mint_b: &Pubkey) -> Result<Option<AmmPool>, AgentError>;

    /// The pool whose LP token is `lp_mint`, or `None` for ordinary tokens.
    async fn pool_by_lp_mint(&self, lp_mint: &Pubkey) -> Result<Option<AmmPool>, AgentError>;

    async fn mint_for_symbol(&self, symbol: &str) -> Result<Option<Pubkey>, AgentError>;

    async fn reserves(&self, pool: &AmmPool) -> Result<PoolReserves, AgentError>;

    async fn withdraw_instructions(
        &self,
        pool: &AmmPool,
        owner: &Pubkey,
        lp_amount: u64,
        slippage_bps: u16,
    ) -> Result<Vec<Instruction>, AgentError>;

    async fn deposit_instructions(
        &self,
        pool: &AmmPool,
        owner: &Pubkey,
        amounts: &LiquidityAmounts,
        slippage_bps: u16,
        native_budget: u64,
    ) -> Result<Vec<Instruction>, AgentError>;

    /// Drops cached registry lookups so the next scan sees fresh data.
    fn clear_cache(&self);
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiPage<T> {
    data: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiMint {
    address: String,
    symbol: Option<String>,
    decimals: u8,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiMintList {
    mint_list: Vec<ApiMint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPoolInfo {
    program_id: String,
    id: String,
    mint_a: ApiMint,
    mint_b: ApiMint,
    lp_mint: Option<ApiMint>,
}

#[derive(Debug, Deserialize)]
struct ApiVaults {
    #[serde(rename = "A")]
    a: String,
    #[serde(rename = "B")]
    b: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPoolKeys {
    program_id: String,
    id: String,
    mint_a: ApiMint,
    mint_b: ApiMint,
    vault: ApiVaults,
    authority: String,
    open_orders: String,
    target_orders: String,
    mint_lp: ApiMint,
    market_program_id: String,
    market_id: String,
    market_authority: String,
    market_base_vault: String,
    market_quote_vault: String,
    market_bids: String,
    market_asks: String,
    market_event_queue: String,
}

fn parse_pubkey(field: &str, value: &str) -> Result<Pubkey, AgentError> {
    Pubkey::from_str(value).map_err(|e| AgentError::Registry(format!("invalid {} {:?}: {}", field, value, e)))
}

fn to_token(field: &str, mint: &ApiMint) -> Result<TokenInfo, AgentError> {
    Ok(TokenInfo {
        mint: parse_pubkey(field, &mint.address)?,
        symbol: mint.symbol.clone().unwrap_or_default(),
        decimals: mint.decimals,
    })
}

fn to_pool(info: &ApiPoolInfo) -> Result<AmmPool, AgentError> {
    let lp = info
        .lp_mint
        .as_ref()
        .ok_or_else(|| AgentError::Registry(format!("pool {} has no LP mint", info.id)))?;
    Ok(AmmPool {
        id: info.id.clone(),
        program_id: parse_pubkey("programId", &info.program_id)?,
        mint_a: to_token("mintA", &info.mint_a)?,
        mint_b: to_token("mintB", &info.mint_b)?,
        lp_mint: parse_pubkey("lpMint", &lp.address)?,
        lp_decimals: lp.decimals,
    })
}

fn to_keys(keys: &ApiPoolKeys) -> Result<AmmPoolKeys, AgentError> {
    Ok(AmmPoolKeys {
        program_id: parse_pubkey("programId", &keys.program_id)?,
        amm_id: parse_pubkey("id", &keys.id)?,
        authority: parse_pubkey("authority", &keys.authority)?,
        open_orders: parse_pubkey("openOrders", &keys.open_orders)?,
        target_orders: parse_pubkey("targetOrders", &keys.target_orders)?,
        lp_mint: parse_pubkey("mintLp", &keys.mint_lp.address)?,
        coin_mint: parse_pubkey("mintA", &keys.mint_a.address)?,
        pc_mint: parse_pubkey("mintB", &keys.mint_b.address)?,
        coin_vault: parse_pubkey("vault.A", &keys.vault.a)?,
        pc_vault: parse_pubkey("vault.B", &keys.vault.b)?,
        market_program_id: parse_pubkey("marketProgramId", &keys.market_program_id)?,
        market_id: parse_pubkey("marketId", &keys.market_id)?,
        market_authority: parse_pubkey("marketAuthority", &keys.market_authority)?,
        market_coin_vault: parse_pubkey("marketBaseVault", &keys.market_base_vault)?,
        market_pc_vault: parse_pubkey("marketQuoteVault", &keys.market_quote_vault)?,
        market_bids: parse_pubkey("marketBids", &keys.market_bids)?,
        market_asks: parse_pubkey("marketAsks", &keys.market_asks)?,
        market_event_queue: parse_pubkey("marketEventQueue", &keys.market_event_queue)?,
    })
}

/// Keeps only AMM v4 pools; the registry also lists CPMM and CLMM pools
/// under the same endpoints.
fn first_amm_v4(infos: impl IntoIterator<Item = ApiPoolInfo>) -> Result<Option<AmmPool>, AgentError> {
    for info in infos {
        let pool = to_pool(&info)?;
        if pool.program_id == AMM_V4_PROGRAM_ID {
            return Ok(Some(pool));
        }
    }
    Ok(None)
}

/// Maps a registry reply to its `data` payload. 429 is the only status that
/// is worth retrying.
fn decode_response<T: DeserializeOwned>(path: &str, status: StatusCode, body: &[u8]) -> Result<T, AgentError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(AgentError::RateLimited(format!("Raydium API {} returned 429", path)));
    }
    if !status.is_success() {
        return Err(AgentError::Registry(format!("Raydium API {} returned {}", path, status)));
    }

    let body: ApiResponse<T> = serde_json::from_slice(body)?;
    match body.data {
        Some(data) if body.success => Ok(data),
        _ => Err(AgentError::Registry(format!(
            "Raydium API {} failed: {}",
            path,
            body.msg.unwrap_or_else(|| "no data".to_string())
        ))),
    }
}

/// Raydium API v3 registry with on-chain reserve reads.
pub struct RaydiumAmm {
    client: Client,
    api_url: String,
    rpc: Arc<dyn ChainRpc>,
    cache_ttl: Duration,
    compute_unit_price: u64,
    lp_cache: DashMap<Pubkey, (Instant, Option<AmmPool>)>,
    keys_cache: DashMap<String, AmmPoolKeys>,
    symbols: DashMap<String, Pubkey>,
}

impl RaydiumAmm {
    pub fn new(
        api_url: &str,
        rpc: Arc<dyn ChainRpc>,
        cache_ttl: Duration,
        compute_unit_price: u64,
    ) -> Result<Self, AgentError> {
        let client = Client::builder().timeout(Duration::from_secs(20)).build()?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            rpc,
            cache_ttl,
            compute_unit_price,
            lp_cache: DashMap::new(),
            keys_cache: DashMap::new(),
            symbols: DashMap::new(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, AgentError> {
        let response = self
            .client
            .get(format!("{}{}", self.api_url, path))
            .query(query)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        decode_response(path, status, &body)
    }

    /// `Some` while the cached lookup for `lp_mint` is younger than the TTL;
    /// the inner `None` caches "not an LP token".
    fn cached_lp_lookup(&self, lp_mint: &Pubkey) -> Option<Option<AmmPool>> {
        let entry = self.lp_cache.get(lp_mint)?;
        let (fetched_at, pool) = entry.value();
        (fetched_at.elapsed() < self.cache_ttl).then(|| pool.clone())
    }

    async fn pool_keys(&self, pool_id: &str) -> Result<AmmPoolKeys, AgentError> {
        if let Some(keys) = self.keys_cache.get(pool_id) {
            return Ok(keys.clone());
        }
        let listed: Vec<Option<ApiPoolKeys>> = self.get("/pools/key/ids", &[("ids", pool_id.to_string())]).await?;
        let raw = listed
            .into_iter()
            .flatten()
            .next()
            .ok_or_else(|| AgentError::Registry(format!("no keys for pool {}", pool_id)))?;
        let keys = to_keys(&raw)?;
        self.keys_cache.insert(pool_id.to_string(), keys.clone());
        Ok(keys)
    }

    async fn load_symbols(&self) -> Result<(), AgentError> {
        let list: ApiMintList = self.get("/mint/list", &[]).await?;
        for mint in list.mint_list {
            let (Some(symbol), Ok(address)) = (mint.symbol, Pubkey::from_str(&mint.address)) else {
                continue;
            };
            // first listing of a symbol wins
            self.symbols.entry(symbol.to_uppercase()).or_insert(address);
        }
        info!("Loaded {} token symbols from the Raydium mint list", self.symbols.len());
        Ok(())
    }
}

#[async_trait]
impl AmmVenue for RaydiumAmm {
    async fn pool_by_id(&self, pool_id: &str) -> Result<Option<AmmPool>, AgentError> {
        let listed: Vec<Option<ApiPoolInfo>> = self.get("/pools/info/ids", &[("ids", pool_id.to_string())]).await?;
        first_amm_v4(listed.into_iter().flatten())
    }

    async fn pool_by_mints(&self, mint_a: &Pubkey, mint_b: &Pubkey) -> Result<Option<AmmPool>, AgentError> {
        let query = [
            ("mint1", mint_a.to_string()),
            ("mint2", mint_b.to_string()),
            ("poolType", "standard".to_string()),
            ("poolSortField", "liquidity".to_string()),
            ("sortType", "desc".to_string()),
            ("pageSize", "20".to_string()),
            ("page", "1".to_string()),
        ];
        let page: ApiPage<ApiPoolInfo> = self.get("/pools/info/mint", &query).await?;
        first_amm_v4(page.data)
    }

    async fn pool_by_lp_mint(&self, lp_mint: &Pubkey) -> Result<Option<AmmPool>, AgentError> {
        if let Some(cached) = self.cached_lp_lookup(lp_mint) {
            return Ok(cached);
        }

        let listed: Vec<Option<ApiPoolInfo>> = self.get("/pools/info/lps", &[("lps", lp_mint.to_string())]).await?;
        let pool = first_amm_v4(listed.into_iter().flatten())?;
        self.lp_cache.insert(*lp_mint, (Instant::now(), pool.clone()));
        Ok(pool)
    }

    async fn mint_for_symbol(&self, symbol: &str) -> Result<Option<Pubkey>, AgentError> {
        let symbol = symbol.trim().to_uppercase();
        if symbol == "SOL" || symbol == "WSOL" {
            return Ok(Some(spl_token::native_mint::id()));
        }
        if self.symbols.is_empty() {
            self.load_symbols().await?;
        }
        Ok(self.symbols.get(&symbol).map(|entry| *entry.value()))
    }

    async fn reserves(&self, pool: &AmmPool) -> Result<PoolReserves, AgentError> {
        let keys = self.pool_keys(&pool.id).await?;
        let base_reserve = self.rpc.token_account_amount(&keys.coin_vault).await?;
        let quote_reserve = self.rpc.token_account_amount(&keys.pc_vault).await?;
        debug!("Pool {} reserves: base {} quote {}", pool.id, base_reserve, quote_reserve);
        Ok(PoolReserves {
            base_reserve,
            quote_reserve,
        })
    }

    async fn withdraw_instructions(
        &self,
        pool: &AmmPool,
        owner: &Pubkey,
        lp_amount: u64,
        slippage_bps: u16,
    ) -> Result<Vec<Instruction>, AgentError> {
        let keys = self.pool_keys(&pool.id).await?;
        let reserves = self.reserves(pool).await?;
        let lp_supply = self.rpc.mint_supply(&pool.lp_mint).await?;

        let (base_out, quote_out) = estimate_withdraw(lp_amount, &reserves, lp_supply)?;
        debug!(
            "Withdrawing {} LP from {}: expect {} base, {} quote",
            lp_amount, pool.id, base_out, quote_out
        );
        build_withdraw(
            &keys,
            owner,
            lp_amount,
            slippage_floor(base_out, slippage_bps),
            slippage_floor(quote_out, slippage_bps),
            self.compute_unit_price,
        )
    }

    async fn deposit_instructions(
        &self,
        pool: &AmmPool,
        owner: &Pubkey,
        amounts: &LiquidityAmounts,
        slippage_bps: u16,
        native_budget: u64,
    ) -> Result<Vec<Instruction>, AgentError> {
        let keys = self.pool_keys(&pool.id).await?;
        build_deposit(&keys, owner, amounts, slippage_bps, native_budget, self.compute_unit_price)
    }

    fn clear_cache(&self) {
        let cleared = self.lp_cache.len();
        self.lp_cache.clear();
        debug!("Cleared {} cached LP mint lookups", cleared);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::mock::MockChain;
    use crate::onchain_instance::instructions::{sample_keys, withdraw_data};
    use serde_json::{Value, json};

    fn offline_venue(chain: Arc<MockChain>) -> RaydiumAmm {
        RaydiumAmm::new("http://127.0.0.1:9", chain, Duration::from_secs(300), 0).unwrap()
    }

    const POOL_INFO: &str = r#"{
        "type": "Standard",
        "programId": "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8",
        "id": "AVs9TA4nWDzfPJE9gGVNJMVhcQy3V9PGazuz33BfG2RA",
        "mintA": { "address": "4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R", "symbol": "RAY", "decimals": 6 },
        "mintB": { "address": "So11111111111111111111111111111111111111112", "symbol": "WSOL", "decimals": 9 },
        "lpMint": { "address": "89ZKE4aoyfLBe2RuV6jM3JGNhaV18Nxh8eNtjRcndBip", "decimals": 6 },
        "tvl": 31000000
    }"#;

    const CPMM_PROGRAM: &str = "CPMMoo8L3F4NbTegBCKVNunggL7H1ZpdTHKxQB5qKP1C";

    fn pool_json(program_id: &str) -> Value {
        let mut pool: Value = serde_json::from_str(POOL_INFO).unwrap();
        pool["programId"] = json!(program_id);
        pool
    }

    fn envelope(data: Value) -> Vec<u8> {
        serde_json::to_vec(&json!({ "id": "b8d7", "success": true, "data": data })).unwrap()
    }

    #[test]
    fn pools_by_id_payload_yields_the_listed_pool() {
        let body = envelope(json!([pool_json(&AMM_V4_PROGRAM_ID.to_string()), null]));
        let listed: Vec<Option<ApiPoolInfo>> = decode_response("/pools/info/ids", StatusCode::OK, &body).unwrap();

        let pool = first_amm_v4(listed.into_iter().flatten()).unwrap().unwrap();
        assert_eq!(pool.id, "AVs9TA4nWDzfPJE9gGVNJMVhcQy3V9PGazuz33BfG2RA");
        assert_eq!(pool.mint_a.symbol, "RAY");
    }

    #[test]
    fn pools_by_lp_payload_skips_other_pool_types() {
        let body = envelope(json!([pool_json(CPMM_PROGRAM), pool_json(&AMM_V4_PROGRAM_ID.to_string())]));
        let listed: Vec<Option<ApiPoolInfo>> = decode_response("/pools/info/lps", StatusCode::OK, &body).unwrap();

        let pool = first_amm_v4(listed.into_iter().flatten()).unwrap().unwrap();
        assert_eq!(pool.program_id, AMM_V4_PROGRAM_ID);
        assert_eq!(pool.lp_mint.to_string(), "89ZKE4aoyfLBe2RuV6jM3JGNhaV18Nxh8eNtjRcndBip");

        let only_cpmm = envelope(json!([pool_json(CPMM_PROGRAM)]));
        let listed: Vec<Option<ApiPoolInfo>> = decode_response("/pools/info/lps", StatusCode::OK, &only_cpmm).unwrap();
        assert_eq!(first_amm_v4(listed.into_iter().flatten()).unwrap(), None);
    }

    #[test]
    fn pools_by_mint_payload_reads_the_page() {
        let body = envelope(json!({
            "count": 1,
            "data": [pool_json(&AMM_V4_PROGRAM_ID.to_string())],
            "hasNextPage": false
        }));
        let page: ApiPage<ApiPoolInfo> = decode_response("/pools/info/mint", StatusCode::OK, &body).unwrap();

        let pool = first_amm_v4(page.data).unwrap().unwrap();
        assert!(pool.contains_mint(&spl_token::native_mint::id()));
    }

    #[test]
    fn error_statuses_and_failed_replies_map_to_errors() {
        let body = envelope(json!([]));

        let limited =
            decode_response::<Vec<Option<ApiPoolInfo>>>("/pools/info/ids", StatusCode::TOO_MANY_REQUESTS, &body);
        assert!(matches!(&limited, Err(AgentError::RateLimited(_))));
        assert!(limited.unwrap_err().is_transient());

        let unavailable =
            decode_response::<Vec<Option<ApiPoolInfo>>>("/pools/info/ids", StatusCode::SERVICE_UNAVAILABLE, &body);
        assert!(matches!(&unavailable, Err(AgentError::Registry(_))));
        assert!(!unavailable.unwrap_err().is_transient());

        let failed = serde_json::to_vec(&json!({ "id": "b8d7", "success": false, "msg": "bad ids" })).unwrap();
        match decode_response::<Vec<Option<ApiPoolInfo>>>("/pools/info/ids", StatusCode::OK, &failed) {
            Err(AgentError::Registry(message)) => assert!(message.contains("bad ids")),
            other => panic!("expected a registry error, got {:?}", other),
        }

        let garbled = decode_response::<Vec<Option<ApiPoolInfo>>>("/pools/info/ids", StatusCode::OK, b"<html>");
        assert!(matches!(garbled, Err(AgentError::Serialization(_))));
    }

    #[test]
    fn converts_registry_pool() {
        let info: ApiPoolInfo = serde_json::from_str(POOL_INFO).unwrap();
        let pool = to_pool(&info).unwrap();

        assert_eq!(pool.program_id, AMM_V4_PROGRAM_ID);
        assert_eq!(pool.mint_b.symbol, "WSOL");
        assert!(pool.contains_mint(&spl_token::native_mint::id()));
        assert_eq!(pool.side_of(&spl_token::native_mint::id()), Some(FixedSide::Quote));
        assert_eq!(pool.lp_decimals, 6);
    }

    #[test]
    fn skips_non_amm_v4_pools() {
        let mut cpmm: ApiPoolInfo = serde_json::from_str(POOL_INFO).unwrap();
        cpmm.program_id = "CPMMoo8L3F4NbTegBCKVNunggL7H1ZpdTHKxQB5qKP1C".to_string();
        assert_eq!(first_amm_v4(vec![cpmm]).unwrap(), None);

        let v4: ApiPoolInfo = serde_json::from_str(POOL_INFO).unwrap();
        assert!(first_amm_v4(vec![v4]).unwrap().is_some());
    }

    #[test]
    fn converts_pool_keys() {
        let any = Pubkey::new_unique().to_string();
        let raw = serde_json::json!({
            "programId": AMM_V4_PROGRAM_ID.to_string(),
            "id": any, "authority": any, "openOrders": any, "targetOrders": any,
            "mintA": { "address": any, "symbol": "RAY", "decimals": 6 },
            "mintB": { "address": spl_token::native_mint::id().to_string(), "symbol": "WSOL", "decimals": 9 },
            "mintLp": { "address": any, "decimals": 6 },
            "vault": { "A": any, "B": any },
            "marketProgramId": any, "marketId": any, "marketAuthority": any,
            "marketBaseVault": any, "marketQuoteVault": any,
            "marketBids": any, "marketAsks": any, "marketEventQueue": any,
            "lookupTableAccount": any, "openTime": "0"
        });
        let keys: ApiPoolKeys = serde_json::from_value(raw).unwrap();
        let keys = to_keys(&keys).unwrap();
        assert_eq!(keys.pc_mint, spl_token::native_mint::id());
        assert_eq!(keys.program_id, AMM_V4_PROGRAM_ID);
    }

    #[tokio::test]
    async fn lp_lookups_come_from_cache_until_cleared() {
        let venue = offline_venue(Arc::new(MockChain::new()));
        let info: ApiPoolInfo = serde_json::from_str(POOL_INFO).unwrap();
        let pool = to_pool(&info).unwrap();
        let plain_token = Pubkey::new_unique();
        venue.lp_cache.insert(pool.lp_mint, (Instant::now(), Some(pool.clone())));
        venue.lp_cache.insert(plain_token, (Instant::now(), None));

        assert_eq!(venue.pool_by_lp_mint(&pool.lp_mint).await.unwrap(), Some(pool.clone()));
        assert_eq!(venue.pool_by_lp_mint(&plain_token).await.unwrap(), None);

        venue.clear_cache();
        assert!(venue.lp_cache.is_empty());
        assert_eq!(venue.cached_lp_lookup(&pool.lp_mint), None);
    }

    #[tokio::test(start_paused = true)]
    async fn lp_cache_entries_expire_after_the_ttl() {
        let venue = offline_venue(Arc::new(MockChain::new()));
        let info: ApiPoolInfo = serde_json::from_str(POOL_INFO).unwrap();
        let pool = to_pool(&info).unwrap();
        venue.lp_cache.insert(pool.lp_mint, (Instant::now(), Some(pool.clone())));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(venue.cached_lp_lookup(&pool.lp_mint), Some(Some(pool.clone())));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(venue.cached_lp_lookup(&pool.lp_mint), None);
    }

    #[tokio::test]
    async fn withdraw_minimums_follow_vaults_and_lp_supply() {
        let info: ApiPoolInfo = serde_json::from_str(POOL_INFO).unwrap();
        let pool = to_pool(&info).unwrap();
        let mut keys = sample_keys(pool.mint_a.mint, pool.mint_b.mint);
        keys.lp_mint = pool.lp_mint;

        let chain = Arc::new(
            MockChain::new()
                .with_account(keys.coin_vault, 1_000_000)
                .with_account(keys.pc_vault, 2_000_000)
                .with_supply(pool.lp_mint, 100_000),
        );
        let venue = offline_venue(chain);
        venue.keys_cache.insert(pool.id.clone(), keys);

        let reserves = venue.reserves(&pool).await.unwrap();
        assert_eq!(
            reserves,
            PoolReserves {
                base_reserve: 1_000_000,
                quote_reserve: 2_000_000,
            }
        );

        let owner = Pubkey::new_unique();
        let instructions = venue.withdraw_instructions(&pool, &owner, 10_000, 100).await.unwrap();
        let withdraw = instructions
            .iter()
            .find(|ix| ix.program_id == AMM_V4_PROGRAM_ID)
            .unwrap();
        // 10% of each vault, less 1%
        assert_eq!(withdraw.data, withdraw_data(10_000, 99_000, 198_000));
    }
}
