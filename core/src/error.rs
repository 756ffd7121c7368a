use thiserror::Error;

/// Failures the core cannot resolve on its own.
/// Domain rule violations travel inside `Rejected`; everything else is
/// infrastructure and must reach the transport boundary as-is.
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Store lock poisoned")]
    StorePoisoned,

    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BotError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(r) => Some(r),
            _ => None,
        }
    }
}

/// A user action refused by a domain rule. State is always left untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("No spins left")]
    InsufficientSpins,

    #[error("Daily bonus already claimed, next one in {remaining_secs}s")]
    BonusOnCooldown { remaining_secs: i64 },

    #[error("Balance {balance} is below the minimum withdrawal of {minimum}")]
    BelowMinimumBalance { balance: u64, minimum: u64 },

    #[error("Amount {amount} must be between {minimum} and {balance}")]
    /// `amount` is the integer as typed; it may be negative or exceed any balance.
    AmountOutOfRange { amount: i128, minimum: u64, balance: u64 },

    #[error("Amount must be a whole number")]
    InvalidAmountFormat,

    #[error("Card number must be exactly 16 digits")]
    InvalidCardFormat,

    #[error("Subscription required for channel {channel}")]
    GateNotSatisfied { channel: String },

    #[error("No withdrawal in progress")]
    NoWithdrawalInProgress,

    #[error("Admin only")]
    NotAdmin,

    #[error("Channel id must not be blank")]
    InvalidChannel,
}

impl Rejection {
    /// Stable snake_case name, for transports that map rejections to messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InsufficientSpins         => "insufficient_spins",
            Self::BonusOnCooldown { .. }    => "bonus_on_cooldown",
            Self::BelowMinimumBalance { .. } => "below_minimum_balance",
            Self::AmountOutOfRange { .. }   => "amount_out_of_range",
            Self::InvalidAmountFormat       => "invalid_amount_format",
            Self::InvalidCardFormat         => "invalid_card_format",
            Self::GateNotSatisfied { .. }   => "gate_not_satisfied",
            Self::NoWithdrawalInProgress    => "no_withdrawal_in_progress",
            Self::NotAdmin                  => "not_admin",
            Self::InvalidChannel            => "invalid_channel",
        }
    }
}

pub type BotResult<T> = Result<T, BotError>;
