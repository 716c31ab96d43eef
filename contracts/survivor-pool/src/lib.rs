//! Survivor Pool Contract
//!
//! A last-player-standing pool over one football season. Players pay a fixed
//! entry fee in a SEP-41 token, pick one team per period (week), and are
//! eliminated when their team loses. A results oracle reports the losing
//! teams once per period; if it never does, remaining players can withdraw
//! their entry fee.
//!
//! ## Player Lifecycle
//! `NotJoined -> Joined -> Picked (period n) -> Picked (period n+1) ... ->
//! Eliminated`. `Eliminated` is terminal. A player still in the game may be
//! refunded once the oracle misses a period's results window.
//!
//! The season ends when at most one player survives a period or the last
//! configured period resolves. There is no winnings payout: the entry fees
//! collected stay in the contract after the season ends, and refunds are
//! only available while a period's results are overdue.
//!
//! ## Resolution
//! `resolve_period` records the oracle's losing teams and settles the first
//! `RESOLUTION_BATCH` players; `process_resolution` settles the rest in
//! further calls. Picks and refunds stay closed until the walk completes and
//! the next period opens.
//!
//! ## Storage Strategy
//! - `instance()`: Owner, Oracle, Token, Config, CurrentPeriod, PickDeadline,
//!   SeasonOver, Pending. Small, fixed-size contract config sharing one
//!   ledger entry.
//! - `persistent()`: Players roster, per-player records, per-period picks,
//!   per-period eliminations and the accounting counters (Balance,
//!   TotalRefunded, Survivors). Each is a separate ledger entry with its TTL
//!   bumped on every write.
//!
//! ## Invariant
//! `balance == entry_fee * player_count - total_refunded` at all times.
//! `balance` is the ledger's own counter, independent of
//! `token.balance(contract_address)`.
#![no_std]
#![allow(unexpected_cfgs)]

use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, log, token::TokenClient,
    Address, Env, Symbol, Vec,
};
use survivor_shared::{mask_contains, team_bit, TeamNumbering, TEAM_COUNT};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Persistent storage TTL in ledgers (~30 days at 5 s/ledger).
pub const PERSISTENT_BUMP_LEDGERS: u32 = 518_400;

/// Upper bound on entries; bounds the roster vector and the number of
/// resolution batches per period.
pub const MAX_PLAYERS: u32 = 256;

/// Players settled per resolution call. Each costs a record read and write
/// plus a pick read, which keeps one call well inside the per-transaction
/// ledger entry limits.
pub const RESOLUTION_BATCH: u32 = 16;

/// One NFL week.
pub const WEEK_SECONDS: u64 = 604_800;

/// Time the oracle gets after a pick deadline before refunds open.
pub const DEFAULT_REFUND_GRACE: u64 = 259_200;

pub const NFL_REGULAR_SEASON_WEEKS: u32 = 17;

/// Periods are numbered from 1.
pub const FIRST_PERIOD: u32 = 1;

// ---------------------------------------------------------------------------
// Error Types
// ---------------------------------------------------------------------------

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized     = 2,
    NotOwner           = 3,
    InvalidOwner       = 4,
    NotOracle          = 5,
    InvalidAmount      = 6,
    InvalidConfig      = 7,
    AlreadyJoined      = 8,
    PastDeadline       = 9,
    WrongFee           = 10,
    PoolFull           = 11,
    NotJoined          = 12,
    Eliminated         = 13,
    InvalidTeam        = 14,
    TeamAlreadyUsed    = 15,
    PeriodStillOpen    = 16,
    ResultsExpired     = 17,
    SeasonOver         = 18,
    NotEligible        = 19,
    AlreadyRefunded    = 20,
    Overflow           = 21,
    ResolutionPending  = 22,
    NoPendingResolution = 23,
}

// ---------------------------------------------------------------------------
// Storage Types
// ---------------------------------------------------------------------------

#[contracttype]
pub enum DataKey {
    // --- instance() ---
    Owner,
    Oracle,
    Token,
    Config,
    CurrentPeriod,
    PickDeadline,
    SeasonOver,
    /// Results of the period whose roster walk is in progress.
    Pending,
    // --- persistent() ---
    /// Entered players in join order.
    Players,
    Player(Address),
    /// Team picked by a player for a period.
    Pick(u32, Address),
    Balance,
    TotalRefunded,
    /// Players neither eliminated nor refunded.
    Survivors,
    /// Players eliminated in a period.
    Eliminated(u32),
}

/// What happens to a player who has no pick when a period resolves.
#[contracttype]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum NoPickPolicy {
    Eliminate = 0,
    Spare = 1,
}

/// Pool parameters fixed at `init`.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PoolConfig {
    /// Exact amount a player must pay to join.
    pub entry_fee: i128,
    /// Joins are accepted while `now < entry_deadline`.
    pub entry_deadline: u64,
    /// Pick deadline of period 1.
    pub first_pick_deadline: u64,
    /// Added to the pick deadline each time a period resolves.
    pub period_length: u64,
    /// Seconds after a pick deadline before an unresolved period opens refunds.
    pub refund_grace: u64,
    pub season_periods: u32,
    pub team_numbering: TeamNumbering,
    pub no_pick_policy: NoPickPolicy,
}

impl PoolConfig {
    /// Weekly periods over a regular season, teams numbered 1..=32, and
    /// no-pick players eliminated.
    pub fn nfl_season(entry_fee: i128, entry_deadline: u64, first_pick_deadline: u64) -> Self {
        PoolConfig {
            entry_fee,
            entry_deadline,
            first_pick_deadline,
            period_length: WEEK_SECONDS,
            refund_grace: DEFAULT_REFUND_GRACE,
            season_periods: NFL_REGULAR_SEASON_WEEKS,
            team_numbering: TeamNumbering::OneBased,
            no_pick_policy: NoPickPolicy::Eliminate,
        }
    }
}

/// Per-player record.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlayerRecord {
    pub joined_at: u64,
    /// Period in which the player was eliminated, if any.
    pub eliminated_in: Option<u32>,
    pub refunded: bool,
    /// Bitmask of team slots used in resolved periods.
    pub used_teams: u32,
}

/// A period whose results are recorded but whose roster is not yet fully
/// settled.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PendingResolution {
    pub period: u32,
    /// Bitmask of losing team slots.
    pub losses: u32,
    /// Roster index of the next player to settle.
    pub cursor: u32,
}

/// Snapshot of the pool returned by `get_pool_state`.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PoolState {
    pub owner: Address,
    pub entry_fee: i128,
    pub balance: i128,
    pub total_refunded: i128,
    pub player_count: u32,
    pub survivor_count: u32,
    pub current_period: u32,
    pub pick_deadline: u64,
    pub season_over: bool,
    pub resolution_pending: bool,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[contractevent]
pub struct Initialized {
    #[topic]
    pub owner: Address,
    pub oracle: Address,
    pub token: Address,
    pub entry_fee: i128,
}

#[contractevent]
pub struct PlayerJoined {
    #[topic]
    pub player: Address,
    pub player_count: u32,
    pub balance: i128,
}

#[contractevent]
pub struct PickMade {
    #[topic]
    pub player: Address,
    #[topic]
    pub period: u32,
    pub team: u32,
    pub changed: bool,
}

#[contractevent]
pub struct PeriodResolved {
    #[topic]
    pub period: u32,
    pub eliminated: Vec<Address>,
    pub survivors: u32,
}

#[contractevent]
pub struct SeasonEnded {
    pub final_period: u32,
    pub survivors: u32,
}

#[contractevent]
pub struct OwnershipTransferred {
    #[topic]
    pub previous_owner: Address,
    #[topic]
    pub new_owner: Address,
}

#[contractevent]
pub struct OracleUpdated {
    #[topic]
    pub oracle: Address,
}

#[contractevent]
pub struct RefundIssued {
    #[topic]
    pub player: Address,
    pub amount: i128,
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

#[contract]
pub struct SurvivorPool;

#[contractimpl]
impl SurvivorPool {
    // -----------------------------------------------------------------------
    // init
    // -----------------------------------------------------------------------

    /// Create the pool. May only be called once, authorized by `owner`.
    ///
    /// `token` is the SEP-41 contract entry fees are paid in. `oracle` is the
    /// only address allowed to report period results.
    pub fn init(
        env: Env,
        owner: Address,
        token: Address,
        oracle: Address,
        config: PoolConfig,
    ) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Owner) {
            return Err(Error::AlreadyInitialized);
        }

        owner.require_auth();

        if config.entry_fee <= 0 {
            return Err(Error::InvalidAmount);
        }
        if config.period_length == 0
            || config.refund_grace == 0
            || config.season_periods == 0
            || config.first_pick_deadline < config.entry_deadline
        {
            return Err(Error::InvalidConfig);
        }

        env.storage().instance().set(&DataKey::Owner, &owner);
        env.storage().instance().set(&DataKey::Oracle, &oracle);
        env.storage().instance().set(&DataKey::Token, &token);
        env.storage().instance().set(&DataKey::Config, &config);
        env.storage()
            .instance()
            .set(&DataKey::CurrentPeriod, &FIRST_PERIOD);
        env.storage()
            .instance()
            .set(&DataKey::PickDeadline, &config.first_pick_deadline);
        env.storage().instance().set(&DataKey::SeasonOver, &false);

        // Seed persistent counters so downstream reads never encounter None.
        set_persistent(&env, DataKey::Players, &Vec::<Address>::new(&env));
        set_persistent(&env, DataKey::Balance, &0i128);
        set_persistent(&env, DataKey::TotalRefunded, &0i128);
        set_persistent(&env, DataKey::Survivors, &0u32);

        Initialized {
            owner,
            oracle,
            token,
            entry_fee: config.entry_fee,
        }
        .publish(&env);

        Ok(())
    }

    // -----------------------------------------------------------------------
    // join
    // -----------------------------------------------------------------------

    /// Enter the pool by paying exactly the entry fee.
    ///
    /// `amount` is transferred from `player` to the contract. The player must
    /// sign an auth tree covering this call and the token sub-call.
    pub fn join(env: Env, player: Address, amount: i128) -> Result<(), Error> {
        require_initialized(&env)?;
        player.require_auth();

        let config = get_config(&env)?;

        let player_key = DataKey::Player(player.clone());
        if env.storage().persistent().has(&player_key) {
            return Err(Error::AlreadyJoined);
        }

        let now = env.ledger().timestamp();
        if now >= config.entry_deadline {
            return Err(Error::PastDeadline);
        }

        if amount != config.entry_fee {
            return Err(Error::WrongFee);
        }

        let mut players = get_players(&env);
        if players.len() >= MAX_PLAYERS {
            return Err(Error::PoolFull);
        }

        let new_balance = get_balance(&env)
            .checked_add(amount)
            .ok_or(Error::Overflow)?;
        let new_survivors = get_survivors(&env)
            .checked_add(1)
            .ok_or(Error::Overflow)?;

        let token = get_token(&env)?;
        TokenClient::new(&env, &token).transfer(&player, env.current_contract_address(), &amount);

        players.push_back(player.clone());
        set_persistent(&env, DataKey::Players, &players);
        set_persistent(
            &env,
            player_key,
            &PlayerRecord {
                joined_at: now,
                eliminated_in: None,
                refunded: false,
                used_teams: 0,
            },
        );
        set_persistent(&env, DataKey::Balance, &new_balance);
        set_persistent(&env, DataKey::Survivors, &new_survivors);

        PlayerJoined {
            player,
            player_count: players.len(),
            balance: new_balance,
        }
        .publish(&env);

        Ok(())
    }

    // -----------------------------------------------------------------------
    // make_pick
    // -----------------------------------------------------------------------

    /// Pick `team` for the active period. Calling again before the deadline
    /// replaces the earlier pick.
    pub fn make_pick(env: Env, player: Address, team: u32) -> Result<(), Error> {
        require_initialized(&env)?;
        player.require_auth();

        let config = get_config(&env)?;
        let record = get_player_record(&env, &player).ok_or(Error::NotJoined)?;

        if record.eliminated_in.is_some() {
            return Err(Error::Eliminated);
        }

        let slot = config
            .team_numbering
            .slot(team)
            .ok_or(Error::InvalidTeam)?;

        if is_season_over_internal(&env) {
            return Err(Error::SeasonOver);
        }

        if env.ledger().timestamp() >= get_pick_deadline(&env)? {
            return Err(Error::PastDeadline);
        }

        if mask_contains(record.used_teams, slot) {
            return Err(Error::TeamAlreadyUsed);
        }

        let period = get_current_period(&env)?;
        let pick_key = DataKey::Pick(period, player.clone());
        let changed = env.storage().persistent().has(&pick_key);
        set_persistent(&env, pick_key, &team);

        PickMade {
            player,
            period,
            team,
            changed,
        }
        .publish(&env);

        Ok(())
    }

    // -----------------------------------------------------------------------
    // resolve_period / process_resolution
    // -----------------------------------------------------------------------

    /// Record the active period's results and settle the first batch of the
    /// roster. Oracle only.
    ///
    /// Every remaining player whose pick is in `losing_teams` is eliminated,
    /// as is every remaining player without a pick when the policy is
    /// `NoPickPolicy::Eliminate`. Survivors have their pick added to their
    /// used-team history. At most `RESOLUTION_BATCH` players are settled per
    /// call; when the roster is longer the rest is settled through
    /// `process_resolution`, and the period advances once the last player is
    /// settled. Returns the players eliminated by this call.
    pub fn resolve_period(
        env: Env,
        oracle: Address,
        losing_teams: Vec<u32>,
    ) -> Result<Vec<Address>, Error> {
        require_initialized(&env)?;
        require_oracle(&env, &oracle)?;

        if is_season_over_internal(&env) {
            return Err(Error::SeasonOver);
        }
        if get_pending(&env).is_some() {
            return Err(Error::ResolutionPending);
        }

        let config = get_config(&env)?;
        let deadline = get_pick_deadline(&env)?;
        let now = env.ledger().timestamp();
        if now < deadline {
            return Err(Error::PeriodStillOpen);
        }
        if now >= deadline.saturating_add(config.refund_grace) {
            return Err(Error::ResultsExpired);
        }

        let mut losses = 0u32;
        for team in losing_teams.iter() {
            let slot = config
                .team_numbering
                .slot(team)
                .ok_or(Error::InvalidTeam)?;
            losses |= team_bit(slot).ok_or(Error::InvalidTeam)?;
        }

        let period = get_current_period(&env)?;
        set_persistent(
            &env,
            DataKey::Eliminated(period),
            &Vec::<Address>::new(&env),
        );

        let pending = PendingResolution {
            period,
            losses,
            cursor: 0,
        };
        settle_batch(&env, &config, pending, RESOLUTION_BATCH)
    }

    /// Settle up to `limit` more players of the period being resolved.
    ///
    /// Results are already fixed by the oracle, so anyone may drive this.
    /// `limit` is clamped to `1..=RESOLUTION_BATCH`. Returns the players
    /// eliminated by this call.
    pub fn process_resolution(env: Env, limit: u32) -> Result<Vec<Address>, Error> {
        require_initialized(&env)?;
        let pending = get_pending(&env).ok_or(Error::NoPendingResolution)?;
        let config = get_config(&env)?;
        settle_batch(&env, &config, pending, limit.clamp(1, RESOLUTION_BATCH))
    }

    // -----------------------------------------------------------------------
    // withdraw_refund
    // -----------------------------------------------------------------------

    /// Reclaim the entry fee after the oracle failed to report the active
    /// period within its grace window. Once per player.
    ///
    /// State is updated before the outgoing token transfer.
    pub fn withdraw_refund(env: Env, player: Address) -> Result<i128, Error> {
        require_initialized(&env)?;
        player.require_auth();

        let mut record = get_player_record(&env, &player).ok_or(Error::NotJoined)?;
        if record.refunded {
            return Err(Error::AlreadyRefunded);
        }
        if record.eliminated_in.is_some() || !refund_window_open(&env)? {
            return Err(Error::NotEligible);
        }

        let amount = get_config(&env)?.entry_fee;
        let new_balance = get_balance(&env)
            .checked_sub(amount)
            .ok_or(Error::Overflow)?;
        let new_refunded = get_total_refunded(&env)
            .checked_add(amount)
            .ok_or(Error::Overflow)?;
        let new_survivors = get_survivors(&env)
            .checked_sub(1)
            .ok_or(Error::Overflow)?;

        record.refunded = true;
        set_persistent(&env, DataKey::Player(player.clone()), &record);
        set_persistent(&env, DataKey::Balance, &new_balance);
        set_persistent(&env, DataKey::TotalRefunded, &new_refunded);
        set_persistent(&env, DataKey::Survivors, &new_survivors);

        let token = get_token(&env)?;
        TokenClient::new(&env, &token).transfer(&env.current_contract_address(), &player, &amount);

        log!(&env, "refund issued", amount);

        RefundIssued { player, amount }.publish(&env);

        Ok(amount)
    }

    // -----------------------------------------------------------------------
    // Administration
    // -----------------------------------------------------------------------

    /// Hand the pool to `new_owner`. Owner only.
    pub fn transfer_ownership(env: Env, owner: Address, new_owner: Address) -> Result<(), Error> {
        require_initialized(&env)?;
        require_owner(&env, &owner)?;

        // The contract's own address can never authorize anything.
        if new_owner == env.current_contract_address() {
            return Err(Error::InvalidOwner);
        }

        env.storage().instance().set(&DataKey::Owner, &new_owner);

        OwnershipTransferred {
            previous_owner: owner,
            new_owner,
        }
        .publish(&env);

        Ok(())
    }

    /// Replace the results oracle. Owner only.
    pub fn set_oracle(env: Env, owner: Address, oracle: Address) -> Result<(), Error> {
        require_initialized(&env)?;
        require_owner(&env, &owner)?;

        env.storage().instance().set(&DataKey::Oracle, &oracle);
        OracleUpdated { oracle }.publish(&env);

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get_owner(env: Env) -> Result<Address, Error> {
        get_owner(&env)
    }

    pub fn get_oracle(env: Env) -> Result<Address, Error> {
        env.storage()
            .instance()
            .get(&DataKey::Oracle)
            .ok_or(Error::NotInitialized)
    }

    pub fn get_config(env: Env) -> Result<PoolConfig, Error> {
        get_config(&env)
    }

    pub fn get_entry_fee(env: Env) -> Result<i128, Error> {
        Ok(get_config(&env)?.entry_fee)
    }

    /// Entry fees held, net of refunds.
    pub fn get_balance(env: Env) -> Result<i128, Error> {
        require_initialized(&env)?;
        Ok(get_balance(&env))
    }

    /// Entered players in join order.
    pub fn get_players(env: Env) -> Result<Vec<Address>, Error> {
        require_initialized(&env)?;
        Ok(get_players(&env))
    }

    pub fn get_player_count(env: Env) -> Result<u32, Error> {
        require_initialized(&env)?;
        Ok(get_players(&env).len())
    }

    pub fn get_survivor_count(env: Env) -> Result<u32, Error> {
        require_initialized(&env)?;
        Ok(get_survivors(&env))
    }

    pub fn has_joined(env: Env, player: Address) -> bool {
        env.storage().persistent().has(&DataKey::Player(player))
    }

    pub fn get_player(env: Env, player: Address) -> Result<PlayerRecord, Error> {
        get_player_record(&env, &player).ok_or(Error::NotJoined)
    }

    pub fn is_eliminated(env: Env, player: Address) -> bool {
        get_player_record(&env, &player)
            .map(|record| record.eliminated_in.is_some())
            .unwrap_or(false)
    }

    /// The player's pick for the active period, if any.
    pub fn get_pick(env: Env, player: Address) -> Result<Option<u32>, Error> {
        let period = get_current_period(&env)?;
        Ok(env.storage().persistent().get(&DataKey::Pick(period, player)))
    }

    /// Teams the player survived with in resolved periods, in slot order.
    pub fn get_pick_history(env: Env, player: Address) -> Result<Vec<u32>, Error> {
        let numbering = get_config(&env)?.team_numbering;
        let record = get_player_record(&env, &player).ok_or(Error::NotJoined)?;

        let mut teams = Vec::new(&env);
        for slot in 0..TEAM_COUNT {
            if mask_contains(record.used_teams, slot) {
                if let Some(team) = numbering.team(slot) {
                    teams.push_back(team);
                }
            }
        }
        Ok(teams)
    }

    pub fn get_current_period(env: Env) -> Result<u32, Error> {
        get_current_period(&env)
    }

    pub fn get_pick_deadline(env: Env) -> Result<u64, Error> {
        get_pick_deadline(&env)
    }

    pub fn is_season_over(env: Env) -> Result<bool, Error> {
        require_initialized(&env)?;
        Ok(is_season_over_internal(&env))
    }

    /// Progress of the period being resolved, if any.
    pub fn get_pending_resolution(env: Env) -> Result<Option<PendingResolution>, Error> {
        require_initialized(&env)?;
        Ok(get_pending(&env))
    }

    /// Players eliminated in `period`, in roster order.
    pub fn get_eliminated(env: Env, period: u32) -> Result<Vec<Address>, Error> {
        require_initialized(&env)?;
        Ok(env
            .storage()
            .persistent()
            .get(&DataKey::Eliminated(period))
            .unwrap_or(Vec::new(&env)))
    }

    pub fn is_refund_window_open(env: Env) -> Result<bool, Error> {
        refund_window_open(&env)
    }

    /// Ledger time as seen by the contract.
    pub fn get_time(env: Env) -> u64 {
        env.ledger().timestamp()
    }

    /// Short code of `team` under the configured numbering, e.g. `ARI`.
    pub fn team_code(env: Env, team: u32) -> Result<Symbol, Error> {
        let code = get_config(&env)?
            .team_numbering
            .code(team)
            .ok_or(Error::InvalidTeam)?;
        Ok(Symbol::new(&env, code))
    }

    /// Point-in-time snapshot of the pool.
    pub fn get_pool_state(env: Env) -> Result<PoolState, Error> {
        let config = get_config(&env)?;
        Ok(PoolState {
            owner: get_owner(&env)?,
            entry_fee: config.entry_fee,
            balance: get_balance(&env),
            total_refunded: get_total_refunded(&env),
            player_count: get_players(&env).len(),
            survivor_count: get_survivors(&env),
            current_period: get_current_period(&env)?,
            pick_deadline: get_pick_deadline(&env)?,
            season_over: is_season_over_internal(&env),
            resolution_pending: get_pending(&env).is_some(),
        })
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn require_initialized(env: &Env) -> Result<(), Error> {
    if !env.storage().instance().has(&DataKey::Owner) {
        return Err(Error::NotInitialized);
    }
    Ok(())
}

fn get_owner(env: &Env) -> Result<Address, Error> {
    env.storage()
        .instance()
        .get(&DataKey::Owner)
        .ok_or(Error::NotInitialized)
}

/// Verify that `caller` is the stored owner and has signed the invocation.
fn require_owner(env: &Env, caller: &Address) -> Result<(), Error> {
    let owner = get_owner(env)?;
    caller.require_auth();
    if caller != &owner {
        return Err(Error::NotOwner);
    }
    Ok(())
}

fn require_oracle(env: &Env, caller: &Address) -> Result<(), Error> {
    let oracle: Address = env
        .storage()
        .instance()
        .get(&DataKey::Oracle)
        .ok_or(Error::NotInitialized)?;
    caller.require_auth();
    if caller != &oracle {
        return Err(Error::NotOracle);
    }
    Ok(())
}

fn get_config(env: &Env) -> Result<PoolConfig, Error> {
    env.storage()
        .instance()
        .get(&DataKey::Config)
        .ok_or(Error::NotInitialized)
}

fn get_token(env: &Env) -> Result<Address, Error> {
    env.storage()
        .instance()
        .get(&DataKey::Token)
        .ok_or(Error::NotInitialized)
}

fn get_current_period(env: &Env) -> Result<u32, Error> {
    env.storage()
        .instance()
        .get(&DataKey::CurrentPeriod)
        .ok_or(Error::NotInitialized)
}

fn get_pick_deadline(env: &Env) -> Result<u64, Error> {
    env.storage()
        .instance()
        .get(&DataKey::PickDeadline)
        .ok_or(Error::NotInitialized)
}

fn is_season_over_internal(env: &Env) -> bool {
    env.storage()
        .instance()
        .get(&DataKey::SeasonOver)
        .unwrap_or(false)
}

/// Refunds open once the active period's results are overdue.
fn refund_window_open(env: &Env) -> Result<bool, Error> {
    let config = get_config(env)?;
    // Results arrived, even if the roster is still being settled.
    if is_season_over_internal(env) || get_pending(env).is_some() {
        return Ok(false);
    }
    let opens_at = get_pick_deadline(env)?.saturating_add(config.refund_grace);
    Ok(env.ledger().timestamp() >= opens_at)
}

fn get_pending(env: &Env) -> Option<PendingResolution> {
    env.storage().instance().get(&DataKey::Pending)
}

/// Settle up to `limit` players starting at the pending cursor, then either
/// store the advanced cursor or close the period.
fn settle_batch(
    env: &Env,
    config: &PoolConfig,
    mut pending: PendingResolution,
    limit: u32,
) -> Result<Vec<Address>, Error> {
    let players = get_players(env);
    let end = pending.cursor.saturating_add(limit).min(players.len());

    let mut survivors = get_survivors(env);
    let mut eliminated = Vec::new(env);
    for player in players.slice(pending.cursor..end).iter() {
        if settle_player(env, config, &pending, &player)? {
            survivors = survivors.checked_sub(1).ok_or(Error::Overflow)?;
            eliminated.push_back(player);
        }
    }
    set_persistent(env, DataKey::Survivors, &survivors);

    let eliminated_key = DataKey::Eliminated(pending.period);
    let mut period_eliminated: Vec<Address> = env
        .storage()
        .persistent()
        .get(&eliminated_key)
        .unwrap_or(Vec::new(env));
    period_eliminated.append(&eliminated);
    set_persistent(env, eliminated_key, &period_eliminated);

    pending.cursor = end;
    log!(env, "resolution batch", pending.period, end, players.len());

    if end < players.len() {
        env.storage().instance().set(&DataKey::Pending, &pending);
    } else {
        env.storage().instance().remove(&DataKey::Pending);
        close_period(env, config, pending.period, period_eliminated, survivors)?;
    }

    Ok(eliminated)
}

/// Apply the pending results to one player. Returns true if eliminated.
fn settle_player(
    env: &Env,
    config: &PoolConfig,
    pending: &PendingResolution,
    player: &Address,
) -> Result<bool, Error> {
    let Some(mut record) = get_player_record(env, player) else {
        return Ok(false);
    };
    if record.eliminated_in.is_some() || record.refunded {
        return Ok(false);
    }

    let pick: Option<u32> = env
        .storage()
        .persistent()
        .get(&DataKey::Pick(pending.period, player.clone()));

    let out = match pick.and_then(|team| config.team_numbering.slot(team)) {
        Some(slot) => {
            if mask_contains(pending.losses, slot) {
                true
            } else {
                record.used_teams |= team_bit(slot).ok_or(Error::InvalidTeam)?;
                false
            }
        }
        None => config.no_pick_policy == NoPickPolicy::Eliminate,
    };

    if out {
        record.eliminated_in = Some(pending.period);
    }
    set_persistent(env, DataKey::Player(player.clone()), &record);
    Ok(out)
}

/// Publish the period's outcome, then end the season or open the next period.
fn close_period(
    env: &Env,
    config: &PoolConfig,
    period: u32,
    eliminated: Vec<Address>,
    survivors: u32,
) -> Result<(), Error> {
    PeriodResolved {
        period,
        eliminated,
        survivors,
    }
    .publish(env);

    if survivors <= 1 || period >= config.season_periods {
        env.storage().instance().set(&DataKey::SeasonOver, &true);
        SeasonEnded {
            final_period: period,
            survivors,
        }
        .publish(env);
        return Ok(());
    }

    let next_period = period.checked_add(1).ok_or(Error::Overflow)?;
    let next_deadline = get_pick_deadline(env)?
        .checked_add(config.period_length)
        .ok_or(Error::Overflow)?;
    env.storage()
        .instance()
        .set(&DataKey::CurrentPeriod, &next_period);
    env.storage()
        .instance()
        .set(&DataKey::PickDeadline, &next_deadline);
    Ok(())
}

fn get_player_record(env: &Env, player: &Address) -> Option<PlayerRecord> {
    env.storage()
        .persistent()
        .get(&DataKey::Player(player.clone()))
}

fn get_players(env: &Env) -> Vec<Address> {
    env.storage()
        .persistent()
        .get(&DataKey::Players)
        .unwrap_or(Vec::new(env))
}

fn get_balance(env: &Env) -> i128 {
    env.storage()
        .persistent()
        .get(&DataKey::Balance)
        .unwrap_or(0)
}

fn get_total_refunded(env: &Env) -> i128 {
    env.storage()
        .persistent()
        .get(&DataKey::TotalRefunded)
        .unwrap_or(0)
}

fn get_survivors(env: &Env) -> u32 {
    env.storage()
        .persistent()
        .get(&DataKey::Survivors)
        .unwrap_or(0)
}

/// Write to persistent storage and extend the entry's TTL in one step.
fn set_persistent<T>(env: &Env, key: DataKey, value: &T)
where
    T: soroban_sdk::IntoVal<Env, soroban_sdk::Val>,
{
    env.storage().persistent().set(&key, value);
    env.storage()
        .persistent()
        .extend_ttl(&key, PERSISTENT_BUMP_LEDGERS, PERSISTENT_BUMP_LEDGERS);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
