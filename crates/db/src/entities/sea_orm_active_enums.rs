//! `SeaORM` active enums backed by Postgres enum types.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "transaction_type")]
pub enum TransactionType {
    #[sea_orm(string_value = "manager_award")]
    ManagerAward,
    #[sea_orm(string_value = "peer_transfer_received")]
    PeerTransferReceived,
    #[sea_orm(string_value = "wellness_reward")]
    WellnessReward,
    #[sea_orm(string_value = "adjustment_credit")]
    AdjustmentCredit,
    #[sea_orm(string_value = "bulk_import")]
    BulkImport,
    #[sea_orm(string_value = "game_win")]
    GameWin,
    #[sea_orm(string_value = "game_refund")]
    GameRefund,
    #[sea_orm(string_value = "jackpot_win")]
    JackpotWin,
    #[sea_orm(string_value = "daily_bonus")]
    DailyBonus,
    #[sea_orm(string_value = "prediction_win")]
    PredictionWin,
    #[sea_orm(string_value = "peer_transfer_sent")]
    PeerTransferSent,
    #[sea_orm(string_value = "store_purchase")]
    StorePurchase,
    #[sea_orm(string_value = "game_bet")]
    GameBet,
    #[sea_orm(string_value = "jackpot_contribution")]
    JackpotContribution,
    #[sea_orm(string_value = "allotment_deposit")]
    AllotmentDeposit,
    #[sea_orm(string_value = "prediction_bet")]
    PredictionBet,
    #[sea_orm(string_value = "adjustment_debit")]
    AdjustmentDebit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "transaction_status")]
pub enum TransactionStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "posted")]
    Posted,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "allotment_period_type")]
pub enum AllotmentPeriodType {
    #[sea_orm(string_value = "monthly")]
    Monthly,
    #[sea_orm(string_value = "quarterly")]
    Quarterly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "pending_transfer_status")]
pub enum PendingTransferStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "claimed")]
    Claimed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}
