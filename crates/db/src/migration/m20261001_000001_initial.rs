//! Initial schema: accounts, ledger transactions, manager allotments and
//! pending transfers.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(ENUMS_SQL).await?;
        db.execute_unprepared(ACCOUNTS_SQL).await?;
        db.execute_unprepared(LEDGER_TRANSACTIONS_SQL).await?;
        db.execute_unprepared(MANAGER_ALLOTMENTS_SQL).await?;
        db.execute_unprepared(PENDING_TRANSFERS_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_SQL).await?;
        Ok(())
    }
}

const ENUMS_SQL: &str = r"
CREATE TYPE transaction_type AS ENUM (
    'manager_award',
    'peer_transfer_received',
    'wellness_reward',
    'adjustment_credit',
    'bulk_import',
    'game_win',
    'game_refund',
    'jackpot_win',
    'daily_bonus',
    'prediction_win',
    'peer_transfer_sent',
    'store_purchase',
    'game_bet',
    'jackpot_contribution',
    'allotment_deposit',
    'prediction_bet',
    'adjustment_debit'
);

CREATE TYPE transaction_status AS ENUM ('pending', 'posted', 'rejected');

CREATE TYPE allotment_period_type AS ENUM ('monthly', 'quarterly');

CREATE TYPE pending_transfer_status AS ENUM ('pending', 'claimed', 'cancelled');
";

const ACCOUNTS_SQL: &str = r"
CREATE TABLE accounts (
    id UUID PRIMARY KEY,
    employee_id UUID NOT NULL,
    balance NUMERIC(20, 2) NOT NULL DEFAULT 0,
    allotment_balance NUMERIC(20, 2) NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_accounts_balance_non_negative CHECK (balance >= 0)
);

-- One account per employee
CREATE UNIQUE INDEX idx_accounts_employee ON accounts(employee_id);
";

const LEDGER_TRANSACTIONS_SQL: &str = r"
CREATE TABLE ledger_transactions (
    id UUID PRIMARY KEY,
    account_id UUID NOT NULL REFERENCES accounts(id),
    transaction_type transaction_type NOT NULL,
    amount NUMERIC(20, 2) NOT NULL,
    status transaction_status NOT NULL DEFAULT 'pending',
    description TEXT NOT NULL,
    source_employee_id UUID,
    target_employee_id UUID,
    wellness_submission_id UUID,
    rejection_reason TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    posted_at TIMESTAMPTZ,
    rejected_at TIMESTAMPTZ,
    CONSTRAINT chk_ledger_amount_positive CHECK (amount > 0),
    CONSTRAINT chk_ledger_posted_at CHECK ((status = 'posted') = (posted_at IS NOT NULL)),
    CONSTRAINT chk_ledger_rejected_at CHECK ((status = 'rejected') = (rejected_at IS NOT NULL))
);

-- History: newest first, id as tie-break
CREATE INDEX idx_ledger_account_created ON ledger_transactions(account_id, created_at DESC, id DESC);

-- Balance and reconciliation aggregates
CREATE INDEX idx_ledger_account_status_type ON ledger_transactions(account_id, status, transaction_type);

-- Allotment usage
CREATE INDEX idx_ledger_award_source ON ledger_transactions(source_employee_id, created_at)
    WHERE transaction_type = 'manager_award' AND status = 'posted';

-- A wellness submission is rewarded at most once
CREATE UNIQUE INDEX idx_ledger_wellness_submission ON ledger_transactions(wellness_submission_id)
    WHERE wellness_submission_id IS NOT NULL;
";

const MANAGER_ALLOTMENTS_SQL: &str = r"
CREATE TABLE manager_allotments (
    id UUID PRIMARY KEY,
    manager_id UUID NOT NULL,
    period_type allotment_period_type NOT NULL,
    amount NUMERIC(20, 2) NOT NULL,
    period_start TIMESTAMPTZ NOT NULL,
    period_end TIMESTAMPTZ NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_allotment_amount_non_negative CHECK (amount >= 0),
    CONSTRAINT chk_allotment_period CHECK (period_end > period_start)
);

-- One row per manager period
CREATE UNIQUE INDEX idx_allotments_manager_period
    ON manager_allotments(manager_id, period_type, period_start);
";

const PENDING_TRANSFERS_SQL: &str = r"
CREATE TABLE pending_transfers (
    id UUID PRIMARY KEY,
    sender_employee_id UUID NOT NULL,
    sender_account_id UUID NOT NULL REFERENCES accounts(id),
    recipient_email VARCHAR(320) NOT NULL,
    amount NUMERIC(20, 2) NOT NULL,
    message TEXT,
    sender_transaction_id UUID NOT NULL REFERENCES ledger_transactions(id),
    status pending_transfer_status NOT NULL DEFAULT 'pending',
    import_job_id UUID,
    recipient_account_id UUID REFERENCES accounts(id),
    recipient_transaction_id UUID REFERENCES ledger_transactions(id),
    refund_transaction_id UUID REFERENCES ledger_transactions(id),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    resolved_at TIMESTAMPTZ,
    CONSTRAINT chk_transfer_amount_positive CHECK (amount > 0),
    CONSTRAINT chk_transfer_email_normalised CHECK (recipient_email = lower(btrim(recipient_email)))
);

-- Claim lookup, oldest first
CREATE INDEX idx_transfers_recipient_pending ON pending_transfers(recipient_email, created_at)
    WHERE status = 'pending';

-- Sender listing
CREATE INDEX idx_transfers_sender ON pending_transfers(sender_employee_id, created_at DESC);

-- Import retries are idempotent per (job, email)
CREATE UNIQUE INDEX idx_transfers_import_key ON pending_transfers(import_job_id, recipient_email)
    WHERE import_job_id IS NOT NULL;
";

const DROP_SQL: &str = r"
DROP TABLE IF EXISTS pending_transfers CASCADE;
DROP TABLE IF EXISTS manager_allotments CASCADE;
DROP TABLE IF EXISTS ledger_transactions CASCADE;
DROP TABLE IF EXISTS accounts CASCADE;
DROP TYPE IF EXISTS pending_transfer_status;
DROP TYPE IF EXISTS allotment_period_type;
DROP TYPE IF EXISTS transaction_status;
DROP TYPE IF EXISTS transaction_type;
";
