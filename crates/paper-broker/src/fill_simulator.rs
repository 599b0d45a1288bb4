//! 체결 시뮬레이터.
//!
//! 가격 이동이 들어올 때마다 해당 심볼의 활성 주문을 검사해 체결 여부를
//! 판정하고, 체결 가격을 결정해 주문 장부에 반영한다.
//!
//! 판정 규칙:
//! - 시장가 주문은 항상 체결 대상이다.
//! - 지정가 주문은 지정가가 현재 종가, 현재 고가/저가, 또는 직전 봉의
//!   고가/저가에 의해 교차되어야 한다.
//! - 추가로 주문 수량이 유동성 한도 안에 있어야 한다: 현재 봉 거래량의
//!   배수, 직전 봉 거래량의 배수, 두 봉 합계의 배수, 또는 롤링 평균
//!   거래량 중 하나라도 만족하면 된다. 한 틱에 소화할 수 없는 크기의
//!   체결을 시뮬레이션하지 않기 위한 장치다.
//!
//! 부분 다중 틱 체결은 모델링하지 않는다. 주문은 한 번의 시뮬레이션
//! 실행에서 남은 수량 전체가 체결된다.

use crate::order_book::OrderBook;
use paper_core::{
    Fill, FillConfig, FillMode, Instrument, InstrumentProvider, Order, OrderType, Price,
    PriceMovement, Side,
};
use rand::Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error};

/// 가격 이동으로부터 체결을 판정하는 시뮬레이터.
pub struct FillSimulator {
    order_book: Arc<OrderBook>,
    instruments: Arc<dyn InstrumentProvider>,
    config: FillConfig,
}

impl FillSimulator {
    /// 새 체결 시뮬레이터를 생성한다.
    pub fn new(
        order_book: Arc<OrderBook>,
        instruments: Arc<dyn InstrumentProvider>,
        config: FillConfig,
    ) -> Self {
        Self {
            order_book,
            instruments,
            config,
        }
    }

    /// 가격 이동에 대해 심볼의 활성 주문들을 검사하고 체결을 반영한다.
    ///
    /// 전량 체결된 주문들을 반환한다. 개별 주문의 반영 실패는 기록하고
    /// 건너뛴다 (해당 틱은 그 주문에 대해 버려진다).
    pub fn check_movement(&self, movement: &PriceMovement) -> Vec<Order> {
        let instrument = match self.instruments.instrument(&movement.symbol) {
            Some(instrument) => instrument,
            None => return Vec::new(),
        };

        let mut filled = Vec::new();
        for order in self.order_book.working_orders_for_symbol(&movement.symbol) {
            if !self.should_fill(&order, &instrument, movement) {
                continue;
            }

            let price = self.fill_price(&order, &instrument, movement);
            let fill = Fill::new(order.remaining_quantity(), price);
            match self.order_book.apply_fill(order.id, fill) {
                Ok(Some(order)) => filled.push(order),
                Ok(None) => {}
                Err(err) => {
                    error!(
                        order_id = %order.id,
                        symbol = %movement.symbol,
                        error = %err,
                        "Failed to apply simulated fill"
                    );
                }
            }
        }
        filled
    }

    /// 주문이 이 가격 이동에서 체결될 수 있는지 판정한다.
    pub fn should_fill(
        &self,
        order: &Order,
        instrument: &Instrument,
        movement: &PriceMovement,
    ) -> bool {
        match order.order_type {
            OrderType::Market => return true,
            OrderType::Stop | OrderType::StopLimit => {
                let stop = match order.stop_price {
                    Some(stop) => stop,
                    None => return false,
                };
                let triggered = match order.side {
                    Side::Buy => movement.close >= stop || movement.high >= stop,
                    Side::Sell => movement.close <= stop || movement.low <= stop,
                };
                if !triggered {
                    return false;
                }
                // 트리거된 스톱 시장가 주문은 시장가처럼 즉시 체결된다
                if order.order_type == OrderType::Stop {
                    return true;
                }
            }
            OrderType::Limit => {}
        }

        let limit = match order.limit_price {
            Some(limit) => limit,
            None => return false,
        };

        let previous = instrument.previous_bar.as_ref();
        let crossed = match order.side {
            Side::Sell => {
                limit <= movement.close
                    || limit <= movement.high
                    || previous.is_some_and(|bar| limit <= bar.high)
            }
            Side::Buy => {
                limit >= movement.close
                    || limit >= movement.low
                    || previous.is_some_and(|bar| limit >= bar.low)
            }
        };
        if !crossed {
            return false;
        }

        let quantity = order.remaining_quantity();
        let multiplier = self.config.liquidity_multiplier;
        let within_liquidity = quantity <= movement.volume * multiplier
            || previous.is_some_and(|bar| quantity <= bar.volume * multiplier)
            || previous.is_some_and(|bar| quantity <= (bar.volume + movement.volume) * multiplier)
            || quantity <= instrument.average_volume;

        if !within_liquidity {
            debug!(
                order_id = %order.id,
                quantity = %quantity,
                bar_volume = %movement.volume,
                average_volume = %instrument.average_volume,
                "Order exceeds liquidity bounds"
            );
        }
        within_liquidity
    }

    /// 체결 가격을 결정한다.
    ///
    /// 결정적 모드에서는 지정가(없으면 종가)를 그대로 사용한다. 무작위
    /// 모드에서는 일정 확률로 정확히 지정가에 체결되고, 나머지는 현재/
    /// 직전 봉과 지정가로 경계 지은 구간에서 균등하게 추출한다.
    pub fn fill_price(
        &self,
        order: &Order,
        instrument: &Instrument,
        movement: &PriceMovement,
    ) -> Price {
        match self.config.mode {
            FillMode::Deterministic => order.limit_price.unwrap_or(movement.close),
            FillMode::Randomized => self.random_fill_price(order, instrument, movement),
        }
    }

    fn random_fill_price(
        &self,
        order: &Order,
        instrument: &Instrument,
        movement: &PriceMovement,
    ) -> Price {
        let limit = match order.limit_price {
            Some(limit) => limit,
            None => return movement.close,
        };

        let mut rng = rand::thread_rng();
        if rng.gen_bool(self.config.exact_limit_probability.clamp(0.0, 1.0)) {
            return limit;
        }

        let previous = instrument.previous_bar.as_ref();
        let (min, max) = match order.side {
            Side::Buy => {
                // 매수는 지정가 이하에서 체결된다
                let mut min = if movement.close < limit {
                    movement.close
                } else {
                    movement.low
                };
                if min > limit {
                    min = previous
                        .map(|bar| if bar.low < limit { bar.low } else { limit })
                        .unwrap_or(limit);
                }
                (min, limit)
            }
            Side::Sell => {
                // 매도는 지정가 이상에서 체결된다
                let mut max = if movement.close > limit {
                    movement.close
                } else {
                    movement.high
                };
                if max < limit {
                    max = previous
                        .map(|bar| if bar.high > limit { bar.high } else { limit })
                        .unwrap_or(limit);
                }
                (limit, max)
            }
        };

        if max <= min {
            return limit;
        }

        let fraction = Decimal::from_f64(rng.gen::<f64>()).unwrap_or(Decimal::ZERO);
        min + (max - min) * fraction
    }
}
