//! End-to-end pre-trade gating scenarios.

use gekko_core::Side;
use risk_manager::{AlertKind, RiskManager, RiskParameters};
use rust_decimal_macros::dec;

#[test]
fn symbol_exposure_rejection_records_the_literal_scenario_values() {
    let mgr = RiskManager::new(RiskParameters::default(), dec!(10000)).unwrap();
    mgr.register_position("BTCUSDT", dec!(0.25), dec!(6000)).unwrap();

    assert!(!mgr.check_position_allowed("BTCUSDT", dec!(0.1), dec!(6000)));

    let alert = mgr
        .alerts()
        .into_iter()
        .find(|a| a.kind == AlertKind::SymbolExposureLimit)
        .expect("symbol exposure alert recorded");
    assert_eq!(alert.current_value, dec!(2100));
    assert_eq!(alert.limit_value, dec!(2000));
}

#[test]
fn exit_levels_bracket_entry_price_on_both_sides() {
    let mgr = RiskManager::new(RiskParameters::default(), dec!(10000)).unwrap();
    let (sl, tp) = mgr.calculate_exit_levels(Side::Buy, dec!(200));
    assert!(sl < dec!(200));
    assert!(tp > dec!(200));
}

#[test]
fn position_lifecycle_releases_exposure_and_folds_pnl_into_today() {
    let mgr = RiskManager::new(RiskParameters::default(), dec!(10000)).unwrap();
    assert!(mgr.check_position_allowed("ETHUSDT", dec!(1), dec!(100)));
    mgr.register_position("ETHUSDT", dec!(1), dec!(100)).unwrap();
    assert_eq!(mgr.open_position_count(), 1);

    mgr.close_position("ETHUSDT", dec!(1), dec!(100), dec!(25)).unwrap();
    assert_eq!(mgr.open_position_count(), 0);
    assert_eq!(mgr.today_pnl(), dec!(25));
}
