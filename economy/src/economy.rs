//! The economy service: one entry point in front of the ledger and games.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, info, instrument};

use capo_common::{
    credit, debit, AccountRef, ChannelId, ClaimKind, EconomyError, GuildConfig, GuildId,
    Initiator, Rejection, Result, SessionKey, SharedClock, SystemClock, TransactionCategory,
    UserId,
};
use capo_games::{
    BlackjackAction, BlackjackTable, CoinSide, GameRng, QuickGames, RandomShoe, SessionStoreConfig,
    Shoe, SlotMachine, SlotSelection, SlotTier,
};
use capo_ledger::{LedgerConfig, LedgerEngine, MemoryStore, MutationRequest, SharedStore};

use crate::action::{ActionReply, PlayerAction};
use crate::config::EconomyConfig;
use crate::event_processor::EventProcessor;
use crate::metrics::{Metrics, SharedMetrics};
use crate::robbery::Robbery;
use crate::rumble::{self, IncomingMessage};
use crate::state::EconomyState;

/// Leaderboard page size when the caller does not ask for one.
const DEFAULT_PER_PAGE: u64 = 10;

/// Business outcome or rejection, inside an infrastructure `Result`.
type Outcome<T> = Result<std::result::Result<T, Rejection>>;

/// The economy engine.
pub struct Economy {
    /// Configuration.
    config: EconomyConfig,
    /// Current service state.
    state: Arc<RwLock<EconomyState>>,
    /// Sole writer of balances.
    ledger: Arc<LedgerEngine>,
    /// External event crediting.
    events: EventProcessor,
    blackjack: BlackjackTable,
    slots: SlotMachine,
    quick: QuickGames,
    robbery: Robbery,
    /// Serializes read-modify-write of guild configuration.
    config_lock: tokio::sync::Mutex<()>,
    metrics: SharedMetrics,
}

impl Economy {
    /// Create an economy over `store`, drawing cards from a random shoe.
    pub fn new(config: EconomyConfig, store: SharedStore, clock: SharedClock) -> Result<Self> {
        let rng = Self::rng(&config);
        let shoe: Arc<dyn Shoe> = Arc::new(RandomShoe::new(rng.clone()));
        Self::with_parts(config, store, clock, rng, shoe)
    }

    /// Create an economy with an explicit random source and card shoe.
    pub fn with_parts(
        config: EconomyConfig,
        store: SharedStore,
        clock: SharedClock,
        rng: GameRng,
        shoe: Arc<dyn Shoe>,
    ) -> Result<Self> {
        config.validate().map_err(EconomyError::Configuration)?;

        let ledger = Arc::new(LedgerEngine::with_clock(
            store,
            clock,
            LedgerConfig {
                actor_idle_timeout: config.ledger.actor_idle_timeout,
            },
        ));
        let sessions = SessionStoreConfig {
            ttl: config.session_ttl(),
        };
        Ok(Self {
            events: EventProcessor::new(ledger.clone()),
            blackjack: BlackjackTable::new(ledger.clone(), shoe, sessions),
            slots: SlotMachine::new(ledger.clone(), rng.clone())?,
            quick: QuickGames::new(ledger.clone(), rng.clone()),
            robbery: Robbery::new(ledger.clone(), rng),
            ledger,
            config,
            state: Arc::new(RwLock::new(EconomyState::Starting)),
            config_lock: tokio::sync::Mutex::new(()),
            metrics: Arc::new(Metrics::new()),
        })
    }

    /// An economy backed by the in-memory store and the wall clock.
    pub fn in_memory(config: EconomyConfig) -> Result<Self> {
        Self::new(config, Arc::new(MemoryStore::new()), Arc::new(SystemClock))
    }

    fn rng(config: &EconomyConfig) -> GameRng {
        match config.games.rng_seed {
            Some(seed) => GameRng::seeded(seed),
            None => GameRng::from_entropy(),
        }
    }

    /// Start accepting actions.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        info!(store = self.ledger.store().name(), "Starting economy");

        let mut state = self.state.write();
        if *state != EconomyState::Starting {
            return Err(EconomyError::Internal(format!(
                "economy cannot start from {:?}",
                *state
            )));
        }
        *state = EconomyState::Running;
        drop(state);
        info!("Economy started");
        Ok(())
    }

    /// Stop accepting actions.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping economy");
        *self.state.write() = EconomyState::ShuttingDown;
        *self.state.write() = EconomyState::Stopped;
        info!(active_actors = self.ledger.active_actors(), "Economy stopped");
        Ok(())
    }

    /// Current service state.
    pub fn state(&self) -> EconomyState {
        *self.state.read()
    }

    /// The ledger behind this economy.
    pub fn ledger(&self) -> &Arc<LedgerEngine> {
        &self.ledger
    }

    /// Service counters.
    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    /// Service configuration.
    pub fn config(&self) -> &EconomyConfig {
        &self.config
    }

    /// Handle one action. Never fails: rejections and infrastructure
    /// errors are both turned into replies.
    #[instrument(skip(self, action), fields(action = action.name(), guild = %action.guild_id()))]
    pub async fn handle(&self, action: PlayerAction) -> ActionReply {
        self.metrics.action_received();

        if !self.state().accepts_requests() {
            self.metrics.action_failed();
            return ActionReply::failed(&EconomyError::NotRunning);
        }

        let name = action.name();
        match self.dispatch(action).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(rejection)) => {
                self.metrics.action_rejected();
                debug!(action = name, code = rejection.code(), "Action rejected");
                ActionReply::rejected(rejection)
            }
            Err(e) => {
                self.metrics.action_failed();
                error!(action = name, error = %e, code = e.error_code(), "Action failed");
                ActionReply::failed(&e)
            }
        }
    }

    async fn dispatch(&self, action: PlayerAction) -> Outcome<ActionReply> {
        match action {
            PlayerAction::Balance { guild_id, user_id } => {
                self.balance(AccountRef::new(guild_id, user_id)).await
            }
            PlayerAction::Leaderboard {
                guild_id,
                page,
                per_page,
            } => self.leaderboard(&guild_id, page, per_page).await,
            PlayerAction::Claim {
                guild_id,
                user_id,
                kind,
            } => self.claim(AccountRef::new(guild_id, user_id), kind).await,
            PlayerAction::Give {
                guild_id,
                admin_id,
                target_id,
                amount,
                reason,
            } => {
                let target = AccountRef::new(guild_id, target_id);
                self.adjust(target, admin_id, credit(amount), TransactionCategory::AdminGrant, reason)
                    .await
            }
            PlayerAction::Take {
                guild_id,
                admin_id,
                target_id,
                amount,
                reason,
            } => {
                let target = AccountRef::new(guild_id, target_id);
                self.adjust(target, admin_id, debit(amount), TransactionCategory::AdminTake, reason)
                    .await
            }
            PlayerAction::SetRobbable {
                guild_id,
                user_id,
                robbable,
            } => {
                self.set_robbable(AccountRef::new(guild_id, user_id), robbable)
                    .await
            }
            PlayerAction::Rob {
                guild_id,
                user_id,
                target_id,
            } => {
                let robber = AccountRef::new(guild_id.clone(), user_id);
                let target = AccountRef::new(guild_id, target_id);
                self.rob(robber, target).await
            }
            PlayerAction::CoinFlip {
                guild_id,
                user_id,
                amount,
                call,
            } => {
                self.coin_flip(AccountRef::new(guild_id, user_id), amount, call)
                    .await
            }
            PlayerAction::Dice {
                guild_id,
                user_id,
                amount,
            } => self.dice(AccountRef::new(guild_id, user_id), amount).await,
            PlayerAction::Slots {
                guild_id,
                user_id,
                tier,
                lines,
            } => {
                self.slots(AccountRef::new(guild_id, user_id), tier, lines)
                    .await
            }
            PlayerAction::SlotsReplay { guild_id, user_id } => {
                self.slots_replay(AccountRef::new(guild_id, user_id)).await
            }
            PlayerAction::BlackjackStart {
                guild_id,
                channel_id,
                user_id,
                bet,
            } => {
                let key = SessionKey::new(guild_id, channel_id, user_id);
                self.blackjack_start(key, bet).await
            }
            PlayerAction::BlackjackAct {
                guild_id,
                channel_id,
                user_id,
                owner_id,
                play,
            } => {
                let owner = owner_id.unwrap_or_else(|| user_id.clone());
                let key = SessionKey::new(guild_id, channel_id, owner);
                self.blackjack_act(key, user_id, play).await
            }
            PlayerAction::ExternalMessage { guild_id, message } => {
                self.external_message(&guild_id, message).await
            }
            PlayerAction::SetRumbleMessage { guild_id, template } => {
                self.update_config(&guild_id, |config| config.rumble_message = template)
                    .await
            }
            PlayerAction::SetRumbleBot { guild_id, bot_id } => {
                self.update_config(&guild_id, |config| config.rumble_bot_id = bot_id)
                    .await
            }
            PlayerAction::SetChannelPayout {
                guild_id,
                channel_id,
                amount,
            } => self.set_channel_payout(&guild_id, channel_id, amount).await,
            PlayerAction::ViewConfig { guild_id } => {
                let config = self.ledger.store().get_config(&guild_id).await?;
                Ok(Ok(ActionReply::Config { config }))
            }
        }
    }

    async fn balance(&self, account: AccountRef) -> Outcome<ActionReply> {
        let balance = self.ledger.balance(&account).await?;
        Ok(Ok(ActionReply::Balance { account, balance }))
    }

    async fn leaderboard(
        &self,
        guild_id: &GuildId,
        page: Option<u64>,
        per_page: Option<u64>,
    ) -> Outcome<ActionReply> {
        let page = self
            .ledger
            .leaderboard(guild_id, page.unwrap_or(1), per_page.unwrap_or(DEFAULT_PER_PAGE))
            .await?;
        Ok(Ok(ActionReply::Leaderboard { page }))
    }

    async fn claim(&self, account: AccountRef, kind: ClaimKind) -> Outcome<ActionReply> {
        let config = self.ledger.store().get_config(&account.guild_id).await?;
        let schedule = *config.schedule(kind);
        Ok(self
            .ledger
            .claim(&account, kind, schedule)
            .await?
            .map(|outcome| ActionReply::Claimed { outcome }))
    }

    /// Administrative grant or take. A take that would overdraw is declined.
    async fn adjust(
        &self,
        target: AccountRef,
        admin: UserId,
        amount: i64,
        category: TransactionCategory,
        reason: Option<String>,
    ) -> Outcome<ActionReply> {
        let reason = reason.unwrap_or_else(|| format!("{} by {admin}", category.as_str()));
        let request = MutationRequest::new(target.clone(), amount, category, Initiator::User(admin))
            .with_reason(reason);
        let outcome = self.ledger.apply(request).await?;
        Ok(outcome.into_result().map(|balance_after| {
            info!(account = %target, amount, balance_after, "Administrative adjustment");
            ActionReply::Adjusted {
                account: target,
                amount,
                balance_after,
            }
        }))
    }

    async fn set_robbable(&self, account: AccountRef, robbable: bool) -> Outcome<ActionReply> {
        Ok(self
            .ledger
            .set_robbable(&account, robbable)
            .await?
            .map(|account| ActionReply::RobbableSet {
                robbable: account.robbable,
                locked_until: account.robbable_locked_until,
            }))
    }

    async fn rob(&self, robber: AccountRef, target: AccountRef) -> Outcome<ActionReply> {
        Ok(self
            .robbery
            .rob(&robber, &target)
            .await?
            .map(|outcome| ActionReply::Robbery { outcome }))
    }

    async fn coin_flip(&self, account: AccountRef, amount: u64, call: CoinSide) -> Outcome<ActionReply> {
        Ok(self.quick.coin_flip(&account, amount, call).await?.map(|outcome| {
            self.metrics.game_settled(outcome.wager, outcome.payout);
            ActionReply::CoinFlip { outcome }
        }))
    }

    async fn dice(&self, account: AccountRef, amount: u64) -> Outcome<ActionReply> {
        Ok(self.quick.roll_die(&account, amount).await?.map(|outcome| {
            self.metrics.game_settled(outcome.wager, outcome.payout);
            ActionReply::Dice { outcome }
        }))
    }

    async fn slots(&self, account: AccountRef, tier: SlotTier, lines: Option<u8>) -> Outcome<ActionReply> {
        let selection = match SlotSelection::new(tier, lines) {
            Ok(selection) => selection,
            Err(illegal) => return Ok(Err(illegal.into())),
        };
        Ok(self.slots.spin(&account, selection).await?.map(|outcome| {
            self.metrics.game_settled(outcome.payout.wager, outcome.payout.payout);
            ActionReply::Slots { outcome }
        }))
    }

    async fn slots_replay(&self, account: AccountRef) -> Outcome<ActionReply> {
        Ok(self.slots.replay(&account).await?.map(|outcome| {
            self.metrics.game_settled(outcome.payout.wager, outcome.payout.payout);
            ActionReply::Slots { outcome }
        }))
    }

    async fn blackjack_start(&self, key: SessionKey, bet: u64) -> Outcome<ActionReply> {
        Ok(self.blackjack.start(&key, bet).await?.map(|view| {
            if let Some(settlement) = &view.settlement {
                self.metrics.game_settled(settlement.total_bet(), settlement.payout);
            }
            ActionReply::Blackjack { view }
        }))
    }

    async fn blackjack_act(
        &self,
        key: SessionKey,
        actor: UserId,
        play: BlackjackAction,
    ) -> Outcome<ActionReply> {
        Ok(self.blackjack.act(&key, &actor, play).await?.map(|view| {
            if let Some(settlement) = &view.settlement {
                self.metrics.game_settled(settlement.total_bet(), settlement.payout);
            }
            ActionReply::Blackjack { view }
        }))
    }

    /// Credit a rumble win announced in `message`, at most once per message.
    async fn external_message(
        &self,
        guild_id: &GuildId,
        message: IncomingMessage,
    ) -> Outcome<ActionReply> {
        let config = self.ledger.store().get_config(guild_id).await?;
        let Some(win) = rumble::recognize(&config, &message) else {
            return Ok(Ok(ActionReply::Ignored));
        };

        let credit = match self
            .events
            .process_once(guild_id, &win.event_id, &win.winner, win.amount)
            .await?
        {
            Ok(credit) => credit,
            Err(rejection) => return Ok(Err(rejection)),
        };

        if credit.credited {
            self.metrics.event_credited();
        } else {
            self.metrics.event_duplicate();
        }

        let announcement = credit
            .credited
            .then(|| config.render_rumble_message(&win.winner, win.amount));
        Ok(Ok(ActionReply::ExternalAward {
            winner: win.winner,
            amount: win.amount,
            credited: credit.credited,
            announcement,
        }))
    }

    async fn set_channel_payout(
        &self,
        guild_id: &GuildId,
        channel_id: ChannelId,
        amount: Option<u64>,
    ) -> Outcome<ActionReply> {
        if amount == Some(0) {
            return Ok(Err(Rejection::InvalidAmount));
        }
        self.update_config(guild_id, |config| match amount {
            Some(amount) => {
                config.channel_payouts.insert(channel_id, amount);
            }
            None => {
                config.channel_payouts.remove(&channel_id);
            }
        })
        .await
    }

    async fn update_config<F>(&self, guild_id: &GuildId, edit: F) -> Outcome<ActionReply>
    where
        F: FnOnce(&mut GuildConfig),
    {
        let _guard = self.config_lock.lock().await;
        let store = self.ledger.store();
        let mut config = store.get_config(guild_id).await?;
        edit(&mut config);
        store.save_config(&config).await?;
        info!(guild = %guild_id, "Guild configuration updated");
        Ok(Ok(ActionReply::Config { config }))
    }
}
