use chrono::Utc;
use rust_decimal::Decimal;

use kx_risk::{evaluate, toggle_kill_switch, RiskAction, RiskOrderInput, RiskRule, RiskState};

#[test]
fn kill_switch_on_rejects_regardless_of_other_rules() {
    let rules = vec![RiskRule::global_sane_defaults()];
    let mut state = RiskState::new_global();
    toggle_kill_switch(&mut state, true, "manual halt");

    let order = RiskOrderInput {
        account_id: "acct-1".to_string(),
        symbol: "005930".to_string(),
        qty: 1,
        estimated_price: Some(Decimal::new(1000, 0)),
    };

    let decision = evaluate(&order, &rules, &mut state, Utc::now());
    assert_eq!(decision.action, RiskAction::Reject);

    toggle_kill_switch(&mut state, false, "cleared");
    let decision = evaluate(&order, &rules, &mut state, Utc::now());
    assert_eq!(decision.action, RiskAction::Allow);
}
