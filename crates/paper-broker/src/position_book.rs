//! 포지션 장부.
//!
//! 제공 기능:
//! - 진입 주문 체결로부터 포지션 오픈 (심볼/계좌/방향별 유일성 보장)
//! - 청산 주문 체결 반영 (부분 청산 지원) 및 전량 청산 시 정산 연계
//! - 포지션 청산 주도 (기존 청산 주문과의 수량 조정)
//! - 가격 이동에 따른 시가 평가
//!
//! 체결 → 포지션 반영 → 계좌 정산은 모두 같은 호출 체인에서 동기적으로
//! 일어난다. 백그라운드 디스패치 순서에 의존하지 않는다.

use crate::account_ledger::AccountLedger;
use crate::events::{BrokerEvent, EventBus};
use crate::order_book::OrderBook;
use dashmap::DashMap;
use paper_core::{
    BrokerError, BrokerResult, InstrumentProvider, Order, OrderIntent, OrderRequest, OrderType,
    Position, PositionType, Price, Side, Symbol,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// 오픈/청산 포지션을 관리하는 포지션 장부.
pub struct PositionBook {
    /// 오픈 포지션
    positions: DashMap<Uuid, Position>,
    /// 전량 청산되어 보관된 포지션
    past_positions: DashMap<Uuid, Position>,
    ledger: Arc<AccountLedger>,
    order_book: Arc<OrderBook>,
    instruments: Arc<dyn InstrumentProvider>,
    events: Arc<EventBus>,
}

impl PositionBook {
    /// 새 포지션 장부를 생성한다.
    pub fn new(
        ledger: Arc<AccountLedger>,
        order_book: Arc<OrderBook>,
        instruments: Arc<dyn InstrumentProvider>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            positions: DashMap::new(),
            past_positions: DashMap::new(),
            ledger,
            order_book,
            instruments,
            events,
        }
    }

    /// 체결된 진입 주문으로부터 포지션을 연다.
    ///
    /// 매수 진입은 롱, 매도 진입은 숏 포지션이 된다. 같은 (심볼, 계좌,
    /// 방향)의 오픈 포지션이 이미 있으면 `PositionAlreadyOpen`으로
    /// 실패한다. 포지션은 주문의 예약 현금/증거금을 승계한다.
    pub fn open_from_order(&self, order: &Order) -> BrokerResult<Position> {
        let position_type = PositionType::from_entry_side(order.side);

        let entry_price = order.filled_average_price.unwrap_or_else(|| {
            if order.quantity.is_zero() {
                Decimal::ZERO
            } else {
                order.market_value / order.quantity
            }
        });

        if let Some(existing) =
            self.open_position(&order.symbol, &order.account_id, position_type)
        {
            // 같은 전략의 추가 진입(랏 분할 형제 주문 포함)은 기존
            // 포지션에 누적한다. 예약도 함께 넘어와 보존된다.
            if existing.strategy_id != order.strategy_id {
                return Err(BrokerError::PositionAlreadyOpen {
                    symbol: order.symbol.clone(),
                    account_id: order.account_id.clone(),
                });
            }

            let position = {
                let mut position = self
                    .positions
                    .get_mut(&existing.id)
                    .ok_or(BrokerError::PositionNotFound(existing.id))?;
                position.increase(order.filled_quantity, entry_price);
                position.reserved_cash += order.reserved_cash;
                position.reserved_margin += order.reserved_margin;
                position.order_ids.push(order.id);
                position.clone()
            };

            info!(
                position_id = %position.id,
                symbol = %position.symbol,
                quantity = %position.quantity,
                average_entry_price = %position.average_entry_price,
                "Position increased"
            );
            return Ok(position);
        }

        let mut position = Position::new(
            order.symbol.clone(),
            order.account_id.clone(),
            position_type,
            order.filled_quantity,
            entry_price,
        );
        position.reserved_cash = order.reserved_cash;
        position.reserved_margin = order.reserved_margin;
        position.strategy_id = order.strategy_id;
        position.order_ids.push(order.id);

        info!(
            position_id = %position.id,
            symbol = %position.symbol,
            position_type = %position.position_type,
            quantity = %position.quantity,
            entry_price = %entry_price,
            "Position opened"
        );

        self.positions.insert(position.id, position.clone());
        self.events
            .publish(BrokerEvent::PositionOpened(position.clone()));
        Ok(position)
    }

    /// 체결된 청산 주문을 반대 방향의 오픈 포지션에 반영한다.
    ///
    /// 포지션 수량은 청산 주문의 체결 수량만큼만 줄어들며, 잔량이 남으면
    /// 포지션은 오픈 상태를 유지한다 (부분 청산). 잔량이 0이 되면 실현
    /// 손익을 확정하고 계좌 정산을 트리거한 뒤 보관한다. 대응하는
    /// 포지션이 없으면 `NoMatchingPosition`으로 실패한다.
    pub fn close_from_order(&self, order: &Order) -> BrokerResult<Position> {
        let target_type = match order.side {
            Side::Buy => PositionType::Short,
            Side::Sell => PositionType::Long,
        };

        let position_id = self
            .open_position(&order.symbol, &order.account_id, target_type)
            .map(|position| position.id)
            .ok_or_else(|| BrokerError::NoMatchingPosition {
                order_id: order.id,
                symbol: order.symbol.clone(),
            })?;

        let close_price = order
            .filled_average_price
            .or(order.limit_price)
            .unwrap_or(Decimal::ZERO);

        let position = {
            let mut position = self
                .positions
                .get_mut(&position_id)
                .ok_or(BrokerError::PositionNotFound(position_id))?;
            position.order_ids.push(order.id);
            position.reduce(order.filled_quantity, close_price);
            position.clone()
        };

        if position.is_closed() {
            // 정산이 실패하면 포지션을 보관하지 않고 에러를 전파한다
            self.ledger.settle_close(&position)?;
            self.positions.remove(&position_id);
            self.past_positions.insert(position_id, position.clone());

            info!(
                position_id = %position_id,
                symbol = %position.symbol,
                realized_profit = %position.realized_profit,
                "Position closed"
            );
            self.events
                .publish(BrokerEvent::PositionClosed(position.clone()));
        } else {
            info!(
                position_id = %position_id,
                remaining = %position.quantity,
                "Position partially closed"
            );
        }

        Ok(position)
    }

    /// 포지션 청산을 주도한다.
    ///
    /// 이미 걸려 있는 청산 주문들의 수량을 남은 보유 수량과 대조한다.
    /// 기존 청산 주문은 현재 시장 가격으로 정정하고, 커버되지 않는
    /// 잔여 수량이 있으면 새 청산 주문을 만든다. `flat`이 참이면 잔여
    /// 수량을 시장가로 청산한다. 포지션에는 청산 잠금을 걸어 전략
    /// 로직이 중복으로 청산을 시도하지 않게 한다.
    pub fn exit_position(&self, position_id: Uuid, flat: bool) -> BrokerResult<Vec<Order>> {
        let snapshot = self
            .positions
            .get(&position_id)
            .map(|position| position.clone())
            .ok_or(BrokerError::PositionNotFound(position_id))?;

        let price = self
            .instruments
            .latest_price(&snapshot.symbol)
            .ok_or_else(|| BrokerError::InstrumentNotFound(snapshot.symbol.clone()))?;

        let closing = self
            .order_book
            .closing_orders_for(&snapshot.symbol, &snapshot.account_id);
        let covered: Decimal = closing.iter().map(|order| order.remaining_quantity()).sum();

        let mut result = Vec::new();
        for order in &closing {
            if order.is_replaceable() {
                result.push(self.order_book.replace_order(order.id, price)?);
            }
        }

        let remainder = snapshot.quantity - covered;
        if remainder > Decimal::ZERO {
            let mut request = OrderRequest::limit(
                snapshot.symbol.clone(),
                snapshot.account_id.clone(),
                snapshot.position_type.closing_side(),
                OrderIntent::Close,
                remainder,
                price,
            );
            if flat {
                request.order_type = OrderType::Market;
                request.limit_price = None;
            }
            // 방금 정정한 청산 주문과 키가 같으므로 중복 제거를 우회한다
            result.extend(self.order_book.submit_order(request, false)?);
        }

        if let Some(mut position) = self.positions.get_mut(&position_id) {
            position.liquidate_lock = true;
            position.updated_at = chrono::Utc::now();
        }

        info!(
            position_id = %position_id,
            symbol = %snapshot.symbol,
            orders = result.len(),
            flat,
            "Position exit initiated"
        );
        Ok(result)
    }

    /// 심볼의 모든 오픈 포지션을 현재 가격으로 재평가한다.
    pub fn mark_to_market(&self, symbol: &Symbol, price: Price) {
        for mut entry in self.positions.iter_mut() {
            let position = entry.value_mut();
            if position.symbol == *symbol {
                position.update_price(price);
            }
        }
    }

    // --- 조회 ---

    /// 오픈/보관 장부에서 포지션을 찾는다.
    pub fn position(&self, position_id: Uuid) -> Option<Position> {
        self.positions
            .get(&position_id)
            .map(|entry| entry.value().clone())
            .or_else(|| {
                self.past_positions
                    .get(&position_id)
                    .map(|entry| entry.value().clone())
            })
    }

    /// 모든 오픈 포지션을 반환한다.
    pub fn positions(&self) -> Vec<Position> {
        self.positions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// 보관된 포지션을 반환한다.
    pub fn past_positions(&self) -> Vec<Position> {
        self.past_positions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// (심볼, 계좌, 방향)의 오픈 포지션을 반환한다.
    pub fn open_position(
        &self,
        symbol: &Symbol,
        account_id: &str,
        position_type: PositionType,
    ) -> Option<Position> {
        self.positions
            .iter()
            .find(|entry| {
                let position = entry.value();
                position.symbol == *symbol
                    && position.account_id == account_id
                    && position.position_type == position_type
                    && position.is_open()
            })
            .map(|entry| entry.value().clone())
    }

    /// 심볼의 오픈 포지션을 반환한다.
    pub fn positions_for_symbol(&self, symbol: &Symbol) -> Vec<Position> {
        self.positions
            .iter()
            .filter(|entry| entry.value().symbol == *symbol)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// 전략의 오픈 포지션을 반환한다.
    pub fn positions_for_strategy(&self, strategy_id: Uuid) -> Vec<Position> {
        self.positions
            .iter()
            .filter(|entry| entry.value().strategy_id == Some(strategy_id))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// 심볼의 가장 최근에 종결된 포지션을 반환한다.
    pub fn last_closed_position(&self, symbol: &Symbol) -> Option<Position> {
        self.past_positions
            .iter()
            .filter(|entry| entry.value().symbol == *symbol)
            .max_by_key(|entry| entry.value().closed_at)
            .map(|entry| entry.value().clone())
    }

    /// 계좌의 오픈 포지션에 예약된 현금 합계를 반환한다.
    pub fn reserved_cash_for(&self, account_id: &str) -> Decimal {
        self.positions
            .iter()
            .filter(|entry| entry.value().account_id == account_id)
            .map(|entry| entry.value().reserved_cash)
            .sum()
    }

    /// 계좌의 오픈 포지션에 예약된 증거금 합계를 반환한다.
    pub fn reserved_margin_for(&self, account_id: &str) -> Decimal {
        self.positions
            .iter()
            .filter(|entry| entry.value().account_id == account_id)
            .map(|entry| entry.value().reserved_margin)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::InstrumentCatalog;
    use chrono::Utc;
    use paper_core::{
        Account, Fill, LedgerConfig, OrderConfig, OrderStatusType, PriceMovement,
    };
    use rust_decimal_macros::dec;

    struct Fixture {
        ledger: Arc<AccountLedger>,
        catalog: Arc<InstrumentCatalog>,
        order_book: Arc<OrderBook>,
        position_book: PositionBook,
    }

    fn movement(close: Decimal) -> PriceMovement {
        PriceMovement::new(
            Symbol::from("AAPL"),
            Utc::now(),
            close,
            close + dec!(1),
            close - dec!(1),
            close,
            dec!(10000),
        )
    }

    fn setup() -> Fixture {
        let ledger = Arc::new(AccountLedger::new(LedgerConfig::default()));
        ledger.add_account(Account::new("default", dec!(40000), dec!(80000), dec!(2)));

        let catalog = Arc::new(InstrumentCatalog::new(30));
        catalog.record_movement(movement(dec!(50)));

        let events = Arc::new(EventBus::default());
        let order_book = Arc::new(OrderBook::new(
            ledger.clone(),
            catalog.clone(),
            events.clone(),
            OrderConfig::default(),
        ));
        let position_book = PositionBook::new(
            ledger.clone(),
            order_book.clone(),
            catalog.clone(),
            events,
        );
        Fixture {
            ledger,
            catalog,
            order_book,
            position_book,
        }
    }

    /// 진입 주문을 만들어 체결까지 진행한다.
    fn filled_open_order(fixture: &Fixture, quantity: Decimal, price: Decimal) -> Order {
        let request = OrderRequest::limit(
            Symbol::from("AAPL"),
            "default",
            Side::Buy,
            OrderIntent::Open,
            quantity,
            price,
        );
        let order = fixture.order_book.create_order(request).unwrap()[0].clone();
        fixture
            .order_book
            .apply_fill(order.id, Fill::new(quantity, price))
            .unwrap()
            .unwrap()
    }

    fn filled_close_order(fixture: &Fixture, quantity: Decimal, price: Decimal) -> Order {
        let request = OrderRequest::limit(
            Symbol::from("AAPL"),
            "default",
            Side::Sell,
            OrderIntent::Close,
            quantity,
            price,
        );
        let order = fixture.order_book.create_order(request).unwrap()[0].clone();
        fixture
            .order_book
            .apply_fill(order.id, Fill::new(quantity, price))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_open_from_order_inherits_reservation() {
        let fixture = setup();

        let order = filled_open_order(&fixture, dec!(100), dec!(50));
        let position = fixture.position_book.open_from_order(&order).unwrap();

        assert_eq!(position.position_type, PositionType::Long);
        assert_eq!(position.quantity, dec!(100));
        assert_eq!(position.average_entry_price, dec!(50));
        assert_eq!(position.purchased_value, dec!(5000));
        assert_eq!(position.reserved_cash, dec!(5000));
    }

    #[test]
    fn test_open_from_order_merges_sibling_lots() {
        let fixture = setup();

        let first = filled_open_order(&fixture, dec!(100), dec!(50));
        let opened = fixture.position_book.open_from_order(&first).unwrap();

        // 같은 전략(여기서는 둘 다 없음)의 추가 진입은 기존 포지션에 누적된다
        let second = filled_open_order(&fixture, dec!(100), dec!(56));
        let merged = fixture.position_book.open_from_order(&second).unwrap();

        assert_eq!(merged.id, opened.id);
        assert_eq!(merged.quantity, dec!(200));
        assert_eq!(merged.purchased_value, dec!(10600));
        assert_eq!(merged.average_entry_price, dec!(53));
        assert_eq!(merged.reserved_cash, dec!(10600));
        assert_eq!(fixture.position_book.positions().len(), 1);
    }

    #[test]
    fn test_open_from_order_rejects_independent_strategy_open() {
        let fixture = setup();

        let strategy_a = Uuid::new_v4();
        let strategy_b = Uuid::new_v4();

        let request = OrderRequest::limit(
            Symbol::from("AAPL"),
            "default",
            Side::Buy,
            OrderIntent::Open,
            dec!(100),
            dec!(50),
        )
        .with_strategy(strategy_a, "alpha");
        let order = fixture.order_book.create_order(request).unwrap()[0].clone();
        let filled = fixture
            .order_book
            .apply_fill(order.id, Fill::new(dec!(100), dec!(50)))
            .unwrap()
            .unwrap();
        fixture.position_book.open_from_order(&filled).unwrap();

        // 다른 전략의 진입은 병합 대상이 아니다
        let request = OrderRequest::limit(
            Symbol::from("AAPL"),
            "default",
            Side::Buy,
            OrderIntent::Open,
            dec!(50),
            dec!(50),
        )
        .with_strategy(strategy_b, "beta");
        let order = fixture.order_book.create_order(request).unwrap()[0].clone();
        let filled = fixture
            .order_book
            .apply_fill(order.id, Fill::new(dec!(50), dec!(50)))
            .unwrap()
            .unwrap();

        let err = fixture.position_book.open_from_order(&filled).unwrap_err();
        assert!(matches!(err, BrokerError::PositionAlreadyOpen { .. }));
    }

    #[test]
    fn test_close_from_order_full_close_settles() {
        let fixture = setup();

        let open = filled_open_order(&fixture, dec!(100), dec!(50));
        fixture.position_book.open_from_order(&open).unwrap();

        let close = filled_close_order(&fixture, dec!(100), dec!(51));
        let position = fixture.position_book.close_from_order(&close).unwrap();

        assert!(position.is_closed());
        assert_eq!(position.realized_profit, dec!(100));

        // 정산 확인: 35000 + 예약 5000 + 손익 100
        let account = fixture.ledger.account("default").unwrap();
        assert_eq!(account.cash_balance, dec!(40100));
        assert_eq!(account.daily_profit, dec!(100));
        assert_eq!(account.wins, 1);

        assert!(fixture.position_book.positions().is_empty());
        assert_eq!(fixture.position_book.past_positions().len(), 1);
    }

    #[test]
    fn test_close_from_order_partial_close_keeps_position_open() {
        let fixture = setup();

        let open = filled_open_order(&fixture, dec!(100), dec!(50));
        fixture.position_book.open_from_order(&open).unwrap();

        let close = filled_close_order(&fixture, dec!(40), dec!(52));
        let position = fixture.position_book.close_from_order(&close).unwrap();

        assert!(position.is_open());
        assert_eq!(position.quantity, dec!(60));
        assert_eq!(position.closed_quantity, dec!(40));
        // 부분 청산 중에는 정산되지 않는다
        let account = fixture.ledger.account("default").unwrap();
        assert_eq!(account.cash_balance, dec!(35000));
    }

    #[test]
    fn test_close_from_order_without_position_fails() {
        let fixture = setup();

        let close = filled_close_order(&fixture, dec!(10), dec!(50));
        let err = fixture.position_book.close_from_order(&close).unwrap_err();
        assert!(matches!(err, BrokerError::NoMatchingPosition { .. }));
    }

    #[test]
    fn test_exit_position_creates_closing_order() {
        let fixture = setup();

        let open = filled_open_order(&fixture, dec!(100), dec!(50));
        let position = fixture.position_book.open_from_order(&open).unwrap();

        let orders = fixture
            .position_book
            .exit_position(position.id, false)
            .unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].intent, OrderIntent::Close);
        assert_eq!(orders[0].side, Side::Sell);
        assert_eq!(orders[0].quantity, dec!(100));
        assert_eq!(orders[0].limit_price, Some(dec!(50)));

        let locked = fixture.position_book.position(position.id).unwrap();
        assert!(locked.liquidate_lock);
    }

    #[test]
    fn test_exit_position_replaces_existing_closing_orders() {
        let fixture = setup();

        let open = filled_open_order(&fixture, dec!(100), dec!(50));
        let position = fixture.position_book.open_from_order(&open).unwrap();

        // 이미 전량을 커버하는 청산 주문이 걸려 있다
        let existing = fixture
            .order_book
            .create_order(OrderRequest::limit(
                Symbol::from("AAPL"),
                "default",
                Side::Sell,
                OrderIntent::Close,
                dec!(100),
                dec!(55),
            ))
            .unwrap()[0]
            .clone();

        // 가격이 52로 이동한 뒤 청산을 주도하면 기존 주문이 정정된다
        fixture.catalog.record_movement(movement(dec!(52)));
        let orders = fixture
            .position_book
            .exit_position(position.id, false)
            .unwrap();

        assert_eq!(orders.len(), 1);
        assert_ne!(orders[0].id, existing.id);
        assert_eq!(orders[0].limit_price, Some(dec!(52)));
        assert_eq!(
            fixture.order_book.order(existing.id).unwrap().status,
            OrderStatusType::Replaced
        );
    }

    #[test]
    fn test_exit_position_flat_uses_market_order() {
        let fixture = setup();

        let open = filled_open_order(&fixture, dec!(100), dec!(50));
        let position = fixture.position_book.open_from_order(&open).unwrap();

        let orders = fixture
            .position_book
            .exit_position(position.id, true)
            .unwrap();
        assert_eq!(orders[0].order_type, OrderType::Market);
    }

    #[test]
    fn test_mark_to_market() {
        let fixture = setup();

        let open = filled_open_order(&fixture, dec!(100), dec!(50));
        let position = fixture.position_book.open_from_order(&open).unwrap();

        fixture
            .position_book
            .mark_to_market(&Symbol::from("AAPL"), dec!(53));

        let updated = fixture.position_book.position(position.id).unwrap();
        assert_eq!(updated.unrealized_profit, dec!(300));
        assert_eq!(updated.market_value, dec!(5300));
    }
}
