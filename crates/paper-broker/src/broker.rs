//! 페이퍼 브로커 파사드.
//!
//! 계좌 원장, 종목 카탈로그, 주문 장부, 포지션 장부, 체결 시뮬레이터를
//! 하나로 묶어 단일 진입점을 제공한다. 가격 이동이 들어오면 시세 반영,
//! 체결 시뮬레이션, 포지션 반영을 순서대로 수행한다.

use crate::account_ledger::AccountLedger;
use crate::events::{BrokerEvent, EventBus};
use crate::fill_simulator::FillSimulator;
use crate::instruments::InstrumentCatalog;
use crate::order_book::OrderBook;
use crate::position_book::PositionBook;
use paper_core::{
    Account, BrokerConfig, BrokerResult, Order, OrderIntent, OrderRequest, Position, Price,
    PriceMovement,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use uuid::Uuid;

/// 모의 체결 브로커.
///
/// 모든 구성 요소는 `Arc`로 공유되며 내부 동기화를 가진다. 파사드 자체는
/// 상태가 없으므로 스레드 간에 자유롭게 공유할 수 있다.
pub struct PaperBroker {
    ledger: Arc<AccountLedger>,
    instruments: Arc<InstrumentCatalog>,
    order_book: Arc<OrderBook>,
    position_book: Arc<PositionBook>,
    simulator: FillSimulator,
    events: Arc<EventBus>,
}

impl PaperBroker {
    /// 설정으로부터 브로커를 구성하고 기본 계좌를 등록한다.
    pub fn new(config: BrokerConfig) -> Self {
        let ledger = Arc::new(AccountLedger::new(config.ledger.clone()));
        ledger.add_account(Account::new(
            config.account.id.clone(),
            config.account.cash_balance,
            config.account.margin_balance,
            config.account.margin_percentage,
        ));

        let instruments = Arc::new(InstrumentCatalog::new(config.fills.average_volume_window));
        let events = Arc::new(EventBus::default());
        let order_book = Arc::new(OrderBook::new(
            ledger.clone(),
            instruments.clone(),
            events.clone(),
            config.orders.clone(),
        ));
        let position_book = Arc::new(PositionBook::new(
            ledger.clone(),
            order_book.clone(),
            instruments.clone(),
            events.clone(),
        ));
        let simulator = FillSimulator::new(
            order_book.clone(),
            instruments.clone(),
            config.fills.clone(),
        );

        info!(account_id = %config.account.id, "Paper broker initialized");
        Self {
            ledger,
            instruments,
            order_book,
            position_book,
            simulator,
            events,
        }
    }

    /// 가격 이동 하나를 파이프라인 전체에 반영한다.
    ///
    /// 시세 기록 → 주문 시가 갱신 → 포지션 평가 → 체결 시뮬레이션 →
    /// 체결된 주문의 포지션 반영 순서로 진행한다. 포지션 반영에
    /// 실패한 주문은 기록하고 건너뛴다.
    pub fn on_price_movement(&self, movement: PriceMovement) {
        self.instruments.record_movement(movement.clone());
        self.order_book.update_with_price(&movement);
        self.position_book
            .mark_to_market(&movement.symbol, movement.close);

        for order in self.simulator.check_movement(&movement) {
            if let Err(err) = self.reconcile_fill(&order) {
                error!(
                    order_id = %order.id,
                    symbol = %order.symbol,
                    error = %err,
                    "Failed to reconcile filled order"
                );
            }
        }
    }

    fn reconcile_fill(&self, order: &Order) -> BrokerResult<Position> {
        match order.intent {
            OrderIntent::Open => self.position_book.open_from_order(order),
            OrderIntent::Close => self.position_book.close_from_order(order),
        }
    }

    /// 주문을 생성한다. 랏 분할 시 여러 주문이 반환된다.
    pub fn create_order(&self, request: OrderRequest) -> BrokerResult<Vec<Order>> {
        self.order_book.create_order(request)
    }

    /// 주문을 취소한다.
    pub fn cancel_order(&self, order_id: Uuid) -> BrokerResult<Order> {
        self.order_book.cancel_order(order_id)
    }

    /// 미체결 주문의 가격을 정정한다.
    pub fn replace_order(&self, order_id: Uuid, new_price: Price) -> BrokerResult<Order> {
        self.order_book.replace_order(order_id, new_price)
    }

    /// 포지션 청산 주문을 낸다. `flat`이면 시장가로 즉시 청산한다.
    pub fn exit_position(&self, position_id: Uuid, flat: bool) -> BrokerResult<Vec<Order>> {
        self.position_book.exit_position(position_id, flat)
    }

    /// 계좌 스냅샷을 반환한다.
    pub fn account(&self, account_id: &str) -> BrokerResult<Account> {
        self.ledger.account(account_id)
    }

    /// 등록된 모든 계좌를 반환한다.
    pub fn accounts(&self) -> Vec<Account> {
        self.ledger.accounts()
    }

    /// 활성 또는 과거 주문을 조회한다.
    pub fn order(&self, order_id: Uuid) -> Option<Order> {
        self.order_book.order(order_id)
    }

    /// 활성 주문 전체를 반환한다.
    pub fn orders(&self) -> Vec<Order> {
        self.order_book.orders()
    }

    /// 종결된 주문 전체를 반환한다.
    pub fn past_orders(&self) -> Vec<Order> {
        self.order_book.past_orders()
    }

    /// 열린 포지션 또는 과거 포지션을 조회한다.
    pub fn position(&self, position_id: Uuid) -> Option<Position> {
        self.position_book.position(position_id)
    }

    /// 열린 포지션 전체를 반환한다.
    pub fn positions(&self) -> Vec<Position> {
        self.position_book.positions()
    }

    /// 종결된 포지션 전체를 반환한다.
    pub fn past_positions(&self) -> Vec<Position> {
        self.position_book.past_positions()
    }

    /// 브로커 이벤트 수신자를 반환한다.
    pub fn subscribe(&self) -> broadcast::Receiver<BrokerEvent> {
        self.events.subscribe()
    }

    /// 계좌의 총 현금을 반환한다.
    ///
    /// 가용 현금과 주문/포지션에 예약된 현금의 합으로, 청산 손익이
    /// 정산되기 전까지는 일정하게 유지된다.
    pub fn total_cash(&self, account_id: &str) -> BrokerResult<Decimal> {
        let account = self.ledger.account(account_id)?;
        Ok(account.cash_balance
            + self.order_book.reserved_cash_for(account_id)
            + self.position_book.reserved_cash_for(account_id))
    }

    /// 계좌의 총 마진을 반환한다. [`total_cash`](Self::total_cash)와
    /// 같은 보존 성질을 가진다.
    pub fn total_margin(&self, account_id: &str) -> BrokerResult<Decimal> {
        let account = self.ledger.account(account_id)?;
        Ok(account.margin_balance
            + self.order_book.reserved_margin_for(account_id)
            + self.position_book.reserved_margin_for(account_id))
    }
}
