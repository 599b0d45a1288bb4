//! 종목 카탈로그.
//!
//! 가격 이동을 수집해 종목별 최근 봉 2개와 롤링 평균 거래량을 유지한다.
//! 체결 판정과 주문 명목 가치 계산의 가격 출처가 된다.

use dashmap::DashMap;
use paper_core::{Instrument, InstrumentProvider, PriceMovement, Quantity, Symbol};
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// 종목별 시장 상태를 유지하는 카탈로그.
#[derive(Debug)]
pub struct InstrumentCatalog {
    instruments: DashMap<Symbol, InstrumentState>,
    average_volume_window: usize,
}

/// 한 종목의 내부 상태.
#[derive(Debug)]
struct InstrumentState {
    instrument: Instrument,
    volumes: VecDeque<Quantity>,
}

impl InstrumentState {
    fn new(symbol: Symbol) -> Self {
        Self {
            instrument: Instrument::new(symbol),
            volumes: VecDeque::new(),
        }
    }

    fn apply(&mut self, movement: PriceMovement, window: usize) {
        self.volumes.push_back(movement.volume);
        while self.volumes.len() > window {
            self.volumes.pop_front();
        }
        let sum: Decimal = self.volumes.iter().copied().sum();
        self.instrument.average_volume = sum / Decimal::from(self.volumes.len());

        self.instrument.previous_bar = self.instrument.last_bar.take();
        self.instrument.last_bar = Some(movement);
    }
}

impl InstrumentCatalog {
    /// 새 카탈로그를 생성한다.
    pub fn new(average_volume_window: usize) -> Self {
        Self {
            instruments: DashMap::new(),
            average_volume_window: average_volume_window.max(1),
        }
    }

    /// 가격 이동을 기록한다.
    ///
    /// 처음 보는 심볼은 자동으로 등록된다.
    pub fn record_movement(&self, movement: PriceMovement) {
        let mut state = self
            .instruments
            .entry(movement.symbol.clone())
            .or_insert_with(|| InstrumentState::new(movement.symbol.clone()));
        state.apply(movement, self.average_volume_window);
    }

    /// 등록된 심볼 목록을 반환한다.
    pub fn symbols(&self) -> Vec<Symbol> {
        self.instruments
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }
}

impl InstrumentProvider for InstrumentCatalog {
    fn instrument(&self, symbol: &Symbol) -> Option<Instrument> {
        self.instruments
            .get(symbol)
            .map(|state| state.instrument.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn movement(close: Decimal, volume: Decimal) -> PriceMovement {
        PriceMovement::new(
            Symbol::from("AAPL"),
            Utc::now(),
            close,
            close + dec!(1),
            close - dec!(1),
            close,
            volume,
        )
    }

    #[test]
    fn test_record_movement_tracks_bars() {
        let catalog = InstrumentCatalog::new(30);
        catalog.record_movement(movement(dec!(100), dec!(1000)));
        catalog.record_movement(movement(dec!(102), dec!(2000)));

        let instrument = catalog.instrument(&Symbol::from("AAPL")).unwrap();
        assert_eq!(instrument.latest_price(), Some(dec!(102)));
        assert_eq!(
            instrument.previous_bar.as_ref().map(|b| b.close),
            Some(dec!(100))
        );
        assert_eq!(instrument.average_volume, dec!(1500));
    }

    #[test]
    fn test_average_volume_window() {
        let catalog = InstrumentCatalog::new(2);
        catalog.record_movement(movement(dec!(100), dec!(1000)));
        catalog.record_movement(movement(dec!(100), dec!(2000)));
        catalog.record_movement(movement(dec!(100), dec!(4000)));

        let instrument = catalog.instrument(&Symbol::from("AAPL")).unwrap();
        // 윈도우 밖의 첫 봉은 평균에서 제외
        assert_eq!(instrument.average_volume, dec!(3000));
    }

    #[test]
    fn test_unknown_symbol() {
        let catalog = InstrumentCatalog::new(30);
        assert!(catalog.instrument(&Symbol::from("ZZZZ")).is_none());
        assert!(catalog.latest_price(&Symbol::from("ZZZZ")).is_none());
    }
}
