//! 계좌 장부.
//!
//! 제공 기능:
//! - 진입 주문에 대한 현금/증거금 예약 (현금 우선, 잔여분은 증거금)
//! - 포지션 청산 시 예약 반환 및 실현 손익 정산
//! - 계좌별 임계 구역을 통한 잔고 변경 직렬화
//!
//! 잔고 변경은 계좌별 엔트리 가드 안에서만 일어나며, 동일 계좌에 대한
//! 동시 변경은 맵 수준에서 직렬화된다.

use dashmap::DashMap;
use paper_core::{Account, BrokerError, BrokerResult, LedgerConfig, Position};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// 주문 하나에 예약된 현금/증거금 몫.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    /// 예약된 현금
    pub cash: Decimal,
    /// 예약된 증거금
    pub margin: Decimal,
}

impl Reservation {
    /// 예약 총액을 반환한다.
    pub fn total(&self) -> Decimal {
        self.cash + self.margin
    }
}

/// 계좌별 현금/증거금 잔고를 관리하는 장부.
#[derive(Debug)]
pub struct AccountLedger {
    accounts: DashMap<String, Account>,
    margin_safety_buffer: Decimal,
    breakeven_band: Decimal,
}

impl AccountLedger {
    /// 새 계좌 장부를 생성한다.
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            accounts: DashMap::new(),
            margin_safety_buffer: config.margin_safety_buffer,
            breakeven_band: config.breakeven_band,
        }
    }

    /// 계좌를 등록한다.
    pub fn add_account(&self, account: Account) {
        info!(
            account_id = %account.id,
            cash = %account.cash_balance,
            margin = %account.margin_balance,
            "Account registered"
        );
        self.accounts.insert(account.id.clone(), account);
    }

    /// 계좌 스냅샷을 반환한다.
    pub fn account(&self, account_id: &str) -> BrokerResult<Account> {
        self.accounts
            .get(account_id)
            .map(|account| account.clone())
            .ok_or_else(|| BrokerError::AccountNotFound(account_id.to_string()))
    }

    /// 모든 계좌 스냅샷을 반환한다.
    pub fn accounts(&self) -> Vec<Account> {
        self.accounts
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// 계좌에 현금을 입금한다.
    pub fn add_cash(&self, account_id: &str, amount: Decimal) -> BrokerResult<()> {
        let mut account = self
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| BrokerError::AccountNotFound(account_id.to_string()))?;
        account.cash_balance += amount;
        account.updated_at = chrono::Utc::now();
        info!(account_id = %account_id, amount = %amount, "Cash deposited");
        Ok(())
    }

    /// 계좌의 증거금 한도를 늘린다.
    pub fn add_margin(&self, account_id: &str, amount: Decimal) -> BrokerResult<()> {
        let mut account = self
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| BrokerError::AccountNotFound(account_id.to_string()))?;
        account.margin_balance += amount;
        account.updated_at = chrono::Utc::now();
        info!(account_id = %account_id, amount = %amount, "Margin added");
        Ok(())
    }

    /// 진입 주문의 명목 가치만큼 현금/증거금을 예약한다.
    ///
    /// 현금을 먼저 사용하고 잔여분은 증거금에서 충당한다. 증거금 몫은
    /// 안전 버퍼를 제외한 가용 증거금을 넘을 수 없다. 예약은 전부 아니면
    /// 전무이며, 실패 시 계좌는 변경되지 않는다.
    pub fn reserve_for_open(
        &self,
        account_id: &str,
        market_value: Decimal,
    ) -> BrokerResult<Reservation> {
        let mut account = self
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| BrokerError::AccountNotFound(account_id.to_string()))?;

        let buying_power = account.buying_power();
        if market_value > buying_power {
            return Err(BrokerError::InsufficientBuyingPower {
                required: market_value,
                available: buying_power,
            });
        }

        let cash = market_value.min(account.cash_balance);
        let margin = market_value - cash;
        if margin > Decimal::ZERO {
            let available_margin =
                (account.margin_balance - self.margin_safety_buffer).max(Decimal::ZERO);
            if margin > available_margin {
                return Err(BrokerError::InsufficientMargin {
                    required: margin,
                    available: available_margin,
                });
            }
        }

        account.cash_balance -= cash;
        account.margin_balance -= margin;
        account.outstanding_margin_balance += margin;
        account.updated_at = chrono::Utc::now();

        debug!(
            account_id = %account_id,
            cash = %cash,
            margin = %margin,
            remaining_cash = %account.cash_balance,
            "Reserved for open order"
        );

        Ok(Reservation { cash, margin })
    }

    /// 예약을 계좌로 되돌린다.
    ///
    /// 주문 정정 시 이전 주문의 예약을 반환할 때 사용한다.
    pub fn release(&self, account_id: &str, reservation: Reservation) -> BrokerResult<()> {
        let mut account = self
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| BrokerError::AccountNotFound(account_id.to_string()))?;

        account.cash_balance += reservation.cash;
        account.margin_balance += reservation.margin;
        account.outstanding_margin_balance -= reservation.margin;
        account.updated_at = chrono::Utc::now();

        debug!(
            account_id = %account_id,
            cash = %reservation.cash,
            margin = %reservation.margin,
            "Reservation released"
        );

        Ok(())
    }

    /// 전량 청산된 포지션을 정산한다.
    ///
    /// 포지션이 승계한 예약을 반환하고 실현 손익을 현금에 반영한다.
    /// 정산 결과 현금이 음수가 되는 경우 잔고를 변경하지 않고 실패한다.
    pub fn settle_close(&self, position: &Position) -> BrokerResult<Account> {
        let mut account = self
            .accounts
            .get_mut(&position.account_id)
            .ok_or_else(|| BrokerError::AccountNotFound(position.account_id.clone()))?;

        let new_cash = account.cash_balance + position.reserved_cash + position.realized_profit;
        if new_cash < Decimal::ZERO {
            warn!(
                account_id = %position.account_id,
                position_id = %position.id,
                balance = %new_cash,
                "Settlement would drive cash negative"
            );
            return Err(BrokerError::CashConservation {
                account_id: position.account_id.clone(),
                balance: new_cash,
            });
        }

        account.cash_balance = new_cash;
        account.margin_balance += position.reserved_margin;
        account.outstanding_margin_balance -= position.reserved_margin;
        account.record_trade_result(position.realized_profit, self.breakeven_band);

        info!(
            account_id = %position.account_id,
            position_id = %position.id,
            realized_profit = %position.realized_profit,
            cash = %account.cash_balance,
            "Position settled"
        );

        Ok(account.clone())
    }
}
