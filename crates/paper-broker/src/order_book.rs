//! 주문 장부.
//!
//! 제공 기능:
//! - 주문 생성 (중복 제거, 랏 분할, 익절 자식 주문, 자금 예약)
//! - 주문 정정/취소 및 보관
//! - 주문별 상호 배제가 보장되는 체결 반영
//! - 심볼/계좌 기준 조회
//!
//! 체결 반영은 주문 ID 단위로 직렬화된다. 진행 중인 주문 ID 집합이
//! 가드 역할을 하며, 같은 ID에 대한 동시 체결 시도는 거부된다.

use crate::account_ledger::{AccountLedger, Reservation};
use crate::events::{BrokerEvent, EventBus};
use dashmap::{DashMap, DashSet};
use paper_core::{
    BrokerError, BrokerResult, Fill, InstrumentProvider, Order, OrderConfig, OrderIntent,
    OrderRequest, OrderStatusType, Price, PriceMovement, Quantity,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// 활성/과거 주문을 관리하는 주문 장부.
pub struct OrderBook {
    /// 아직 체결 가능성이 있는 주문
    orders: DashMap<Uuid, Order>,
    /// 최종 상태에 도달해 보관된 주문
    past_orders: DashMap<Uuid, Order>,
    /// 현재 체결 반영 중인 주문 ID
    fills_in_flight: DashSet<Uuid>,
    ledger: Arc<AccountLedger>,
    instruments: Arc<dyn InstrumentProvider>,
    events: Arc<EventBus>,
    lot_size: Decimal,
}

impl OrderBook {
    /// 새 주문 장부를 생성한다.
    pub fn new(
        ledger: Arc<AccountLedger>,
        instruments: Arc<dyn InstrumentProvider>,
        events: Arc<EventBus>,
        config: OrderConfig,
    ) -> Self {
        Self {
            orders: DashMap::new(),
            past_orders: DashMap::new(),
            fills_in_flight: DashSet::new(),
            ledger,
            instruments,
            events,
            lot_size: config.lot_size,
        }
    }

    /// 요청으로부터 주문을 생성한다.
    ///
    /// 동일한 (심볼, 방향, 의도, 계좌)의 미완료 주문이 이미 있으면 새로
    /// 만들지 않고 그 주문을 반환한다. 랏 분할 임계값을 초과하는 수량은
    /// 균등한 형제 주문들로 분할된다. 진입 주문은 계좌에서 자금을
    /// 예약하며, 분할된 랏 중 하나라도 실패하면 이미 예약된 몫을 되돌리고
    /// 전체 생성을 중단한다.
    pub fn create_order(&self, request: OrderRequest) -> BrokerResult<Vec<Order>> {
        self.submit_order(request, true)
    }

    /// 주문을 생성한다. 정정/청산 경로는 의도적으로 추가 수량을 만들므로
    /// 중복 제거 없이 제출한다.
    pub(crate) fn submit_order(
        &self,
        request: OrderRequest,
        dedupe: bool,
    ) -> BrokerResult<Vec<Order>> {
        let instrument = self
            .instruments
            .instrument(&request.symbol)
            .ok_or_else(|| BrokerError::InstrumentNotFound(request.symbol.clone()))?;
        let price = request
            .limit_price
            .or_else(|| instrument.latest_price())
            .ok_or_else(|| BrokerError::InstrumentNotFound(request.symbol.clone()))?;

        // 청산 주문은 예약이 없으므로 계좌 존재만 확인한다
        if request.intent == OrderIntent::Close {
            self.ledger.account(&request.account_id)?;
        }

        if dedupe {
            if let Some(existing) = self.find_duplicate(&request) {
                info!(
                    order_id = %existing.id,
                    symbol = %request.symbol,
                    "Duplicate order request, returning existing order"
                );
                return Ok(vec![existing]);
            }
        }

        let mut created: Vec<Order> = Vec::new();
        for quantity in split_lots(request.quantity, self.lot_size) {
            match self.build_order(&request, quantity, price) {
                Ok(order) => created.push(order),
                Err(err) => {
                    self.rollback_reservations(&created);
                    return Err(err);
                }
            }
        }

        for order in &created {
            self.orders.insert(order.id, order.clone());
            info!(
                order_id = %order.id,
                symbol = %order.symbol,
                side = %order.side,
                intent = %order.intent,
                quantity = %order.quantity,
                "Order created"
            );
            self.events.publish(BrokerEvent::OrderCreated(order.clone()));
        }

        Ok(created)
    }

    /// 단일 랏 주문을 구성하고 자금을 예약한다.
    fn build_order(
        &self,
        request: &OrderRequest,
        quantity: Quantity,
        price: Price,
    ) -> BrokerResult<Order> {
        let mut lot_request = request.clone();
        lot_request.quantity = quantity;

        let mut order = Order::from_request(lot_request);
        order.status = OrderStatusType::Accepted;
        order.refresh_market_value(price);

        if order.intent == OrderIntent::Open {
            let reservation = self
                .ledger
                .reserve_for_open(&order.account_id, order.market_value)?;
            order.reserved_cash = reservation.cash;
            order.reserved_margin = reservation.margin;

            if let Some(take_profit) = request.take_profit {
                let child_request = OrderRequest::limit(
                    order.symbol.clone(),
                    order.account_id.clone(),
                    order.side.opposite(),
                    OrderIntent::Close,
                    quantity,
                    take_profit,
                );
                let mut child = Order::from_request(child_request);
                child.status = OrderStatusType::PendingActivation;
                child.parent_id = Some(order.id);
                child.strategy_id = order.strategy_id;
                child.strategy_name = order.strategy_name.clone();
                order.child_orders.push(child);
            }
        }

        Ok(order)
    }

    /// 생성 도중 실패 시 이미 예약된 랏들의 자금을 되돌린다.
    fn rollback_reservations(&self, orders: &[Order]) {
        for order in orders {
            if order.intent != OrderIntent::Open {
                continue;
            }
            let reservation = Reservation {
                cash: order.reserved_cash,
                margin: order.reserved_margin,
            };
            if let Err(err) = self.ledger.release(&order.account_id, reservation) {
                error!(
                    order_id = %order.id,
                    error = %err,
                    "Failed to roll back reservation"
                );
            }
        }
    }

    /// 주문을 취소한다.
    ///
    /// 부모 체결을 대기 중인 자식 주문과 이미 최종 상태인 주문은
    /// 변경 없이 그대로 반환한다. 그 외에는 `Canceled`로 전이하고
    /// 내장된 자식 주문들도 재귀적으로 취소한 뒤 보관한다.
    /// 기본 설계에서 취소는 예약을 자동으로 반환하지 않는다.
    pub fn cancel_order(&self, order_id: Uuid) -> BrokerResult<Order> {
        let canceled = {
            let mut order = match self.orders.get_mut(&order_id) {
                Some(order) => order,
                None => {
                    // 보관된 주문 취소는 무변경으로 현재 상태를 돌려준다
                    return self
                        .past_orders
                        .get(&order_id)
                        .map(|entry| entry.value().clone())
                        .ok_or(BrokerError::OrderNotFound(order_id));
                }
            };

            if order.status == OrderStatusType::PendingActivation || order.status.is_final() {
                return Ok(order.clone());
            }

            let now = chrono::Utc::now();
            order.status = OrderStatusType::Canceled;
            order.canceled_at = Some(now);
            order.updated_at = now;
            cancel_children(&mut order.child_orders, now);
            order.clone()
        };

        self.archive(order_id);
        info!(order_id = %order_id, symbol = %canceled.symbol, "Order canceled");
        self.events
            .publish(BrokerEvent::OrderCanceled(canceled.clone()));
        Ok(canceled)
    }

    /// 주문을 새 지정가로 정정한다.
    ///
    /// 기존 주문은 `Replaced`로 보관되고 그 예약은 계좌로 반환된다.
    /// 남은 수량과 거래 조건을 승계한 새 주문이 생성되면서 다시
    /// 예약하므로, 정정 전후의 예약 총합은 0으로 상쇄된다.
    pub fn replace_order(&self, order_id: Uuid, new_price: Price) -> BrokerResult<Order> {
        let (old, prior_status) = {
            let mut order = match self.orders.get_mut(&order_id) {
                Some(order) => order,
                None => {
                    // 보관된 주문은 최종 상태이므로 정정할 수 없다
                    return Err(if self.past_orders.contains_key(&order_id) {
                        BrokerError::OrderNotReplaceable(order_id)
                    } else {
                        BrokerError::OrderNotFound(order_id)
                    });
                }
            };

            if !order.is_replaceable() {
                return Err(BrokerError::OrderNotReplaceable(order_id));
            }

            let prior_status = order.status;
            order.status = OrderStatusType::PendingReplace;
            order.updated_at = chrono::Utc::now();
            (order.clone(), prior_status)
        };

        if old.intent == OrderIntent::Open {
            let reservation = Reservation {
                cash: old.reserved_cash,
                margin: old.reserved_margin,
            };
            self.ledger.release(&old.account_id, reservation)?;
        }

        let mut request = OrderRequest::limit(
            old.symbol.clone(),
            old.account_id.clone(),
            old.side,
            old.intent,
            old.remaining_quantity(),
            new_price,
        );
        request.time_in_force = old.time_in_force;
        request.strategy_id = old.strategy_id;
        request.strategy_name = old.strategy_name.clone();
        request.reason = old.reason.clone();

        // 대체 주문을 먼저 완전히 확보한다. 실패하면 이전 주문을 원상
        // 복구하므로 정정은 전부 아니면 전무다. 이전 주문이 아직 활성
        // 장부에 남아 있으니 중복 제거는 우회한다.
        let new_order = match self.submit_order(request, false) {
            Ok(mut created) => match created.pop() {
                Some(order) => order,
                None => {
                    self.restore_after_failed_replace(order_id, prior_status, &old);
                    return Err(BrokerError::OrderNotReplaceable(order_id));
                }
            },
            Err(err) => {
                self.restore_after_failed_replace(order_id, prior_status, &old);
                return Err(err);
            }
        };

        let old = {
            let mut order = self
                .orders
                .get_mut(&order_id)
                .ok_or(BrokerError::OrderNotFound(order_id))?;
            order.status = OrderStatusType::Replaced;
            order.updated_at = chrono::Utc::now();
            order.clone()
        };
        self.archive(order_id);

        info!(
            old_order_id = %order_id,
            new_order_id = %new_order.id,
            price = %new_price,
            "Order replaced"
        );
        self.events.publish(BrokerEvent::OrderReplaced {
            old: Box::new(old),
            new: Box::new(new_order.clone()),
        });
        Ok(new_order)
    }

    /// 대체 주문 확보에 실패한 정정을 되돌린다.
    ///
    /// 반환했던 예약을 다시 잡고 이전 주문을 정정 전 상태로 복구한다.
    fn restore_after_failed_replace(
        &self,
        order_id: Uuid,
        prior_status: OrderStatusType,
        old: &Order,
    ) {
        if old.intent == OrderIntent::Open {
            let total = old.reserved_cash + old.reserved_margin;
            match self.ledger.reserve_for_open(&old.account_id, total) {
                Ok(reservation) => {
                    if let Some(mut order) = self.orders.get_mut(&order_id) {
                        order.reserved_cash = reservation.cash;
                        order.reserved_margin = reservation.margin;
                    }
                }
                Err(err) => {
                    error!(
                        order_id = %order_id,
                        error = %err,
                        "Failed to restore reservation after replace failure"
                    );
                }
            }
        }
        if let Some(mut order) = self.orders.get_mut(&order_id) {
            order.status = prior_status;
            order.updated_at = chrono::Utc::now();
        }
    }

    /// 체결을 주문에 반영한다.
    ///
    /// 같은 주문 ID에 대한 체결 반영은 엄격히 직렬화된다. 반영이 진행
    /// 중인 주문에 대한 두 번째 시도는 `DuplicateFillRejected`로 거부되고,
    /// 이미 전량 체결되었거나 최종 상태인 주문에 대한 반영은 아무 변경
    /// 없이 `None`을 반환한다 (중복 전달 멱등성).
    ///
    /// 전량 체결 시 `Some(order)`를 반환하며, 주문은 보관되고 자식
    /// 익절 주문들이 `Working` 상태로 활성화된다.
    pub fn apply_fill(&self, order_id: Uuid, fill: Fill) -> BrokerResult<Option<Order>> {
        if !self.fills_in_flight.insert(order_id) {
            return Err(BrokerError::DuplicateFillRejected(order_id));
        }
        let result = self.apply_fill_locked(order_id, fill);
        self.fills_in_flight.remove(&order_id);
        result
    }

    fn apply_fill_locked(&self, order_id: Uuid, fill: Fill) -> BrokerResult<Option<Order>> {
        let (filled, children) = {
            let mut order = match self.orders.get_mut(&order_id) {
                Some(order) => order,
                None => {
                    // 보관된 주문은 이미 최종 상태다. 체결 후 도착한
                    // 중복 전달이므로 변경 없이 무시한다
                    return if self.past_orders.contains_key(&order_id) {
                        Ok(None)
                    } else {
                        Err(BrokerError::OrderNotFound(order_id))
                    };
                }
            };

            if order.status.is_final() || order.remaining_quantity() <= Decimal::ZERO {
                return Ok(None);
            }

            if !order.record_fill(fill) {
                return Ok(None);
            }

            let children = std::mem::take(&mut order.child_orders);
            (order.clone(), children)
        };

        self.archive(order_id);

        for mut child in children {
            child.mark_working();
            info!(
                order_id = %child.id,
                parent_id = %order_id,
                "Take-profit child order activated"
            );
            self.orders.insert(child.id, child.clone());
            self.events.publish(BrokerEvent::OrderCreated(child));
        }

        info!(
            order_id = %order_id,
            symbol = %filled.symbol,
            average_price = ?filled.filled_average_price,
            "Order filled"
        );
        self.events.publish(BrokerEvent::OrderFilled(filled.clone()));
        Ok(Some(filled))
    }

    /// 가격 이동으로 해당 심볼 주문들의 명목 가치를 갱신하고,
    /// 대기 중인 주문을 체결 대상으로 활성화한다.
    pub fn update_with_price(&self, movement: &PriceMovement) {
        for mut entry in self.orders.iter_mut() {
            let order = entry.value_mut();
            if order.symbol != movement.symbol || !order.is_unfulfilled() {
                continue;
            }
            order.refresh_market_value(movement.close);
            if matches!(
                order.status,
                OrderStatusType::Pending | OrderStatusType::Accepted
            ) {
                order.mark_working();
            }
        }
    }

    /// 활성 주문을 보관 장부로 이동한다.
    fn archive(&self, order_id: Uuid) {
        if let Some((_, order)) = self.orders.remove(&order_id) {
            self.past_orders.insert(order_id, order);
        }
    }

    fn find_duplicate(&self, request: &OrderRequest) -> Option<Order> {
        self.orders
            .iter()
            .find(|entry| {
                let order = entry.value();
                order.symbol == request.symbol
                    && order.side == request.side
                    && order.intent == request.intent
                    && order.account_id == request.account_id
                    && order.is_unfulfilled()
            })
            .map(|entry| entry.value().clone())
    }

    // --- 조회 ---

    /// 활성/보관 장부에서 주문을 찾는다.
    pub fn order(&self, order_id: Uuid) -> Option<Order> {
        self.orders
            .get(&order_id)
            .map(|entry| entry.value().clone())
            .or_else(|| {
                self.past_orders
                    .get(&order_id)
                    .map(|entry| entry.value().clone())
            })
    }

    /// 모든 활성 주문을 반환한다.
    pub fn orders(&self) -> Vec<Order> {
        self.orders
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// 보관된 주문을 반환한다.
    pub fn past_orders(&self) -> Vec<Order> {
        self.past_orders
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// 심볼의 활성 주문을 반환한다.
    pub fn orders_for_symbol(&self, symbol: &paper_core::Symbol) -> Vec<Order> {
        self.orders
            .iter()
            .filter(|entry| entry.value().symbol == *symbol)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// 계좌의 활성 주문을 반환한다.
    pub fn orders_for_account(&self, account_id: &str) -> Vec<Order> {
        self.orders
            .iter()
            .filter(|entry| entry.value().account_id == account_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// 심볼의 체결 대상(`Working`) 주문을 반환한다.
    pub fn working_orders_for_symbol(&self, symbol: &paper_core::Symbol) -> Vec<Order> {
        self.orders
            .iter()
            .filter(|entry| {
                let order = entry.value();
                order.symbol == *symbol && order.status == OrderStatusType::Working
            })
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// 심볼/계좌의 미완료 청산 주문을 반환한다.
    pub fn closing_orders_for(
        &self,
        symbol: &paper_core::Symbol,
        account_id: &str,
    ) -> Vec<Order> {
        self.orders
            .iter()
            .filter(|entry| {
                let order = entry.value();
                order.symbol == *symbol
                    && order.account_id == account_id
                    && order.intent == OrderIntent::Close
                    && order.is_unfulfilled()
            })
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// 전략의 활성 주문을 반환한다.
    pub fn orders_for_strategy(&self, strategy_id: Uuid) -> Vec<Order> {
        self.orders
            .iter()
            .filter(|entry| entry.value().strategy_id == Some(strategy_id))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// 계좌의 활성 주문에 예약된 현금 합계를 반환한다.
    pub fn reserved_cash_for(&self, account_id: &str) -> Decimal {
        self.orders
            .iter()
            .filter(|entry| entry.value().account_id == account_id)
            .map(|entry| entry.value().reserved_cash)
            .sum()
    }

    /// 계좌의 활성 주문에 예약된 증거금 합계를 반환한다.
    pub fn reserved_margin_for(&self, account_id: &str) -> Decimal {
        self.orders
            .iter()
            .filter(|entry| entry.value().account_id == account_id)
            .map(|entry| entry.value().reserved_margin)
            .sum()
    }
}

/// 자식 주문들을 재귀적으로 취소한다.
fn cancel_children(children: &mut [Order], now: chrono::DateTime<chrono::Utc>) {
    for child in children {
        if child.status.is_final() {
            continue;
        }
        child.status = OrderStatusType::Canceled;
        child.canceled_at = Some(now);
        child.updated_at = now;
        cancel_children(&mut child.child_orders, now);
    }
}

/// 수량을 랏 분할 임계값 이하의 랏으로 나눈다.
///
/// 랏들은 거의 균등하며, 나누어 떨어지지 않는 수량은 마지막 랏이
/// 잔여분을 가져가 합계가 원래 수량과 정확히 일치하도록 한다.
fn split_lots(quantity: Quantity, lot_size: Decimal) -> Vec<Quantity> {
    if lot_size <= Decimal::ZERO || quantity <= lot_size {
        return vec![quantity];
    }
    let lots = (quantity / lot_size).ceil().to_u64().unwrap_or(1).max(1);
    let per_lot = (quantity / Decimal::from(lots)).round_dp_with_strategy(
        8,
        rust_decimal::RoundingStrategy::ToZero,
    );
    let mut quantities = vec![per_lot; (lots - 1) as usize];
    quantities.push(quantity - per_lot * Decimal::from(lots - 1));
    quantities
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::InstrumentCatalog;
    use chrono::Utc;
    use paper_core::{Account, LedgerConfig, PriceMovement, Side, Symbol};
    use rust_decimal_macros::dec;

    fn movement(symbol: &str, close: Decimal, volume: Decimal) -> PriceMovement {
        PriceMovement::new(
            Symbol::from(symbol),
            Utc::now(),
            close,
            close + dec!(1),
            close - dec!(1),
            close,
            volume,
        )
    }

    fn setup() -> (Arc<AccountLedger>, Arc<InstrumentCatalog>, OrderBook) {
        let ledger = Arc::new(AccountLedger::new(LedgerConfig::default()));
        ledger.add_account(Account::new("default", dec!(40000), dec!(80000), dec!(2)));

        let catalog = Arc::new(InstrumentCatalog::new(30));
        catalog.record_movement(movement("AAPL", dec!(50), dec!(10000)));

        let book = OrderBook::new(
            ledger.clone(),
            catalog.clone(),
            Arc::new(EventBus::default()),
            OrderConfig::default(),
        );
        (ledger, catalog, book)
    }

    fn open_buy(quantity: Decimal, price: Decimal) -> OrderRequest {
        OrderRequest::limit(
            Symbol::from("AAPL"),
            "default",
            Side::Buy,
            OrderIntent::Open,
            quantity,
            price,
        )
    }

    #[test]
    fn test_create_order_reserves_cash() {
        let (ledger, _, book) = setup();

        let orders = book.create_order(open_buy(dec!(100), dec!(50))).unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].reserved_cash, dec!(5000));
        assert_eq!(orders[0].market_value, dec!(5000));
        assert_eq!(orders[0].status, OrderStatusType::Accepted);

        let account = ledger.account("default").unwrap();
        assert_eq!(account.cash_balance, dec!(35000));
    }

    #[test]
    fn test_create_order_unknown_instrument() {
        let (_, _, book) = setup();

        let request = OrderRequest::limit(
            Symbol::from("ZZZZ"),
            "default",
            Side::Buy,
            OrderIntent::Open,
            dec!(10),
            dec!(50),
        );
        let err = book.create_order(request).unwrap_err();
        assert!(matches!(err, BrokerError::InstrumentNotFound(_)));
    }

    #[test]
    fn test_create_order_deduplicates() {
        let (_, _, book) = setup();

        let first = book.create_order(open_buy(dec!(10), dec!(50))).unwrap();
        let second = book.create_order(open_buy(dec!(10), dec!(50))).unwrap();

        assert_eq!(first[0].id, second[0].id);
        assert_eq!(book.orders().len(), 1);
    }

    #[test]
    fn test_create_order_splits_lots() {
        let (_, _, book) = setup();

        let orders = book.create_order(open_buy(dec!(250), dec!(50))).unwrap();
        assert_eq!(orders.len(), 3);
        for order in &orders {
            assert!(order.quantity <= dec!(100));
        }
        let total: Decimal = orders.iter().map(|o| o.quantity).sum();
        assert_eq!(total, dec!(250));
    }

    #[test]
    fn test_create_order_rollback_on_partial_failure() {
        let (ledger, _, book) = setup();

        // 3랏 중 일부만 감당 가능한 잔고: 200주 × 50 = 시장가치 10000이
        // 랏당 5000씩 2랏으로 나뉘고, 잔고를 7000으로 줄이면 두 번째 랏이 실패
        let poor = Account::new("poor", dec!(7000), Decimal::ZERO, dec!(2));
        ledger.add_account(poor);

        let request = OrderRequest::limit(
            Symbol::from("AAPL"),
            "poor",
            Side::Buy,
            OrderIntent::Open,
            dec!(200),
            dec!(50),
        );
        let err = book.create_order(request).unwrap_err();
        assert!(err.is_funds_rejection());

        // 전부 아니면 전무: 첫 랏의 예약이 되돌려져야 한다
        let account = ledger.account("poor").unwrap();
        assert_eq!(account.cash_balance, dec!(7000));
        assert!(book.orders().is_empty());
    }

    #[test]
    fn test_apply_fill_archives_and_averages() {
        let (_, _, book) = setup();

        let order = book.create_order(open_buy(dec!(100), dec!(50))).unwrap()[0].clone();
        let filled = book
            .apply_fill(order.id, Fill::new(dec!(100), dec!(50)))
            .unwrap()
            .unwrap();

        assert_eq!(filled.status, OrderStatusType::Filled);
        assert_eq!(filled.filled_average_price, Some(dec!(50)));
        assert!(book.orders().is_empty());
        assert_eq!(book.past_orders().len(), 1);
        assert_eq!(book.order(order.id).unwrap().status, OrderStatusType::Filled);
    }

    #[test]
    fn test_apply_fill_is_idempotent() {
        let (_, _, book) = setup();

        let order = book.create_order(open_buy(dec!(100), dec!(50))).unwrap()[0].clone();
        let first = book
            .apply_fill(order.id, Fill::new(dec!(100), dec!(50)))
            .unwrap();
        assert!(first.is_some());

        // 동일 체결의 중복 전달은 무시된다
        let second = book
            .apply_fill(order.id, Fill::new(dec!(100), dec!(50)))
            .unwrap();
        assert!(second.is_none());
        assert_eq!(book.order(order.id).unwrap().filled_quantity, dec!(100));
    }

    #[test]
    fn test_concurrent_fills_serialize_per_order() {
        let (_, _, book) = setup();
        let book = Arc::new(book);

        let order = book.create_order(open_buy(dec!(100), dec!(50))).unwrap()[0].clone();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let book = book.clone();
            let order_id = order.id;
            handles.push(std::thread::spawn(move || {
                book.apply_fill(order_id, Fill::new(dec!(100), dec!(50)))
            }));
        }

        let mut filled_count = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Ok(Some(_)) => filled_count += 1,
                Ok(None) => {}
                Err(BrokerError::DuplicateFillRejected(_)) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        // 정확히 하나의 호출만 체결을 반영한다
        assert_eq!(filled_count, 1);
        assert_eq!(book.order(order.id).unwrap().filled_quantity, dec!(100));
    }

    #[test]
    fn test_take_profit_child_activates_on_fill() {
        let (_, _, book) = setup();

        let request = open_buy(dec!(100), dec!(50)).with_take_profit(dec!(55));
        let order = book.create_order(request).unwrap()[0].clone();
        assert_eq!(order.child_orders.len(), 1);
        assert_eq!(
            order.child_orders[0].status,
            OrderStatusType::PendingActivation
        );

        book.apply_fill(order.id, Fill::new(dec!(100), dec!(50)))
            .unwrap();

        let active = book.orders();
        assert_eq!(active.len(), 1);
        let child = &active[0];
        assert_eq!(child.status, OrderStatusType::Working);
        assert_eq!(child.side, Side::Sell);
        assert_eq!(child.intent, OrderIntent::Close);
        assert_eq!(child.limit_price, Some(dec!(55)));
        assert_eq!(child.parent_id, Some(order.id));
    }

    #[test]
    fn test_cancel_order_cancels_children() {
        let (_, _, book) = setup();

        let request = open_buy(dec!(100), dec!(50)).with_take_profit(dec!(55));
        let order = book.create_order(request).unwrap()[0].clone();

        let canceled = book.cancel_order(order.id).unwrap();
        assert_eq!(canceled.status, OrderStatusType::Canceled);
        assert_eq!(
            canceled.child_orders[0].status,
            OrderStatusType::Canceled
        );
        assert!(book.orders().is_empty());
    }

    #[test]
    fn test_cancel_is_noop_for_terminal_order() {
        let (_, _, book) = setup();

        let order = book.create_order(open_buy(dec!(100), dec!(50))).unwrap()[0].clone();
        book.apply_fill(order.id, Fill::new(dec!(100), dec!(50)))
            .unwrap();

        // 이미 체결되어 보관된 주문의 취소는 상태 변경 없는 무해한 호출이다
        let canceled = book.cancel_order(order.id).unwrap();
        assert_eq!(canceled.status, OrderStatusType::Filled);
        assert!(book.orders().is_empty());
        assert_eq!(book.past_orders().len(), 1);
    }

    #[test]
    fn test_replace_order_nets_reservation_to_zero() {
        let (ledger, _, book) = setup();

        let order = book.create_order(open_buy(dec!(100), dec!(50))).unwrap()[0].clone();
        assert_eq!(ledger.account("default").unwrap().cash_balance, dec!(35000));

        let replaced = book.replace_order(order.id, dec!(48)).unwrap();
        assert_eq!(replaced.limit_price, Some(dec!(48)));
        assert_eq!(replaced.quantity, dec!(100));
        assert_ne!(replaced.id, order.id);

        let old = book.order(order.id).unwrap();
        assert_eq!(old.status, OrderStatusType::Replaced);

        // 예약은 이전 것이 해제되고 새 가격으로 다시 잡힌다
        let account = ledger.account("default").unwrap();
        assert_eq!(account.cash_balance, dec!(40000) - dec!(48) * dec!(100));
    }

    #[test]
    fn test_replace_filled_order_fails() {
        let (_, _, book) = setup();

        let order = book.create_order(open_buy(dec!(100), dec!(50))).unwrap()[0].clone();
        book.apply_fill(order.id, Fill::new(dec!(100), dec!(50)))
            .unwrap();

        let err = book.replace_order(order.id, dec!(48)).unwrap_err();
        assert!(matches!(err, BrokerError::OrderNotReplaceable(_)));
    }

    #[test]
    fn test_replace_failure_keeps_old_order_intact() {
        let (ledger, _, book) = setup();

        let order = book.create_order(open_buy(dec!(100), dec!(50))).unwrap()[0].clone();
        assert_eq!(ledger.account("default").unwrap().cash_balance, dec!(35000));

        // 잔고로 감당할 수 없는 가격으로의 정정은 거부되고,
        // 기존 주문과 그 예약은 원래대로 남아야 한다
        let err = book.replace_order(order.id, dec!(1300)).unwrap_err();
        assert!(err.is_funds_rejection());

        let old = book.order(order.id).unwrap();
        assert_eq!(old.status, OrderStatusType::Accepted);
        assert_eq!(old.reserved_cash, dec!(5000));
        assert_eq!(book.orders().len(), 1);

        let account = ledger.account("default").unwrap();
        assert_eq!(account.cash_balance, dec!(35000));
    }

    #[test]
    fn test_update_with_price_promotes_to_working() {
        let (_, _, book) = setup();

        let order = book.create_order(open_buy(dec!(100), dec!(50))).unwrap()[0].clone();
        assert_eq!(order.status, OrderStatusType::Accepted);

        book.update_with_price(&movement("AAPL", dec!(51), dec!(10000)));

        let updated = book.order(order.id).unwrap();
        assert_eq!(updated.status, OrderStatusType::Working);
        assert_eq!(updated.market_value, dec!(5100));
    }

    #[test]
    fn test_split_lots() {
        assert_eq!(split_lots(dec!(100), dec!(100)), vec![dec!(100)]);
        assert_eq!(split_lots(dec!(101), dec!(100)).len(), 2);
        assert_eq!(
            split_lots(dec!(300), dec!(100)),
            vec![dec!(100), dec!(100), dec!(100)]
        );
    }
}
