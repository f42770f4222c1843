// node/tests/runtime.rs
use custody_core::{Address, Amount, ManualClock, SECONDS_PER_YEAR};
use node::{NodeConfig, Runtime, RuntimeError, World};
use strategy::{OrchestratorError, OrchestratorPhase, RecoveryAction, StepOutcome, VenueKind};

const T0: u64 = 1_700_000_000;

fn config() -> NodeConfig {
    let mut config = NodeConfig::default();
    config.genesis_time = Some(T0);
    config
}

fn label(name: &str) -> Address {
    Address::from_label(name)
}

struct Setup {
    runtime: Runtime,
    weth: Address,
    usdc: Address,
    orchestrator: Address,
    agent: Address,
    alice: Address,
}

/// Genesis world with alice's funds pooled in the orchestrator
fn pooled() -> Setup {
    let mut runtime = Runtime::genesis(&config(), &ManualClock::new(0)).unwrap();
    let (weth, usdc) = (label("weth"), label("usdc"));
    let orchestrator = label("orchestrator");
    let alice = label("alice");

    for asset in [weth, usdc] {
        // Interest and simulated yield are paid out of these balances
        runtime
            .fund(label("lending-ledger"), asset, Amount::from_u64(100_000))
            .unwrap();
        runtime
            .fund(label("yield-reserve"), asset, Amount::from_u64(100_000))
            .unwrap();
        runtime.fund(alice, asset, Amount::from_u64(10_000)).unwrap();
        runtime
            .approve(alice, asset, orchestrator, Amount::from_u64(10_000))
            .unwrap();
    }
    runtime.deposit(alice, weth, Amount::from_u64(1_000)).unwrap();
    runtime.deposit(alice, usdc, Amount::from_u64(2_000)).unwrap();

    Setup {
        runtime,
        weth,
        usdc,
        orchestrator,
        agent: label("agent"),
        alice,
    }
}

#[test]
fn test_genesis_from_default_config() {
    let runtime = Runtime::genesis(&config(), &ManualClock::new(0)).unwrap();
    let world = runtime.world();

    assert_eq!(runtime.now(), T0);
    assert_eq!(world.orchestrator.phase(), OrchestratorPhase::Idle);
    assert_eq!(world.orchestrator.pair().unwrap().base, label("weth"));
    assert_eq!(world.lending.ledger().supported_assets().len(), 2);
    assert_eq!(
        world.lending.ledger().get_lending_apy(&label("usdc")).unwrap(),
        500
    );
}

#[test]
fn test_genesis_uses_clock_without_fixed_time() {
    let runtime = Runtime::genesis(&NodeConfig::default(), &ManualClock::new(42)).unwrap();
    assert_eq!(runtime.now(), 42);
}

#[test]
fn test_deposit_without_allowance_is_reverted() {
    let mut s = pooled();
    let bob = label("bob");
    s.runtime.fund(bob, s.weth, Amount::from_u64(100)).unwrap();
    let before = s.runtime.world().clone();

    assert!(s.runtime.deposit(bob, s.weth, Amount::from_u64(100)).is_err());
    assert_eq!(s.runtime.world(), &before);
    assert_eq!(s.runtime.balance_of(&s.weth, &bob), Amount::from_u64(100));
}

#[test]
fn test_lending_then_switch_to_market_making() {
    let mut s = pooled();

    s.runtime
        .provision_lending(s.agent, Amount::from_u64(1_000), Amount::from_u64(2_000))
        .unwrap();
    assert_eq!(
        s.runtime.world().orchestrator.phase(),
        OrchestratorPhase::InLending
    );
    assert!(s.runtime.balance_of(&s.weth, &s.orchestrator).is_zero());

    s.runtime.advance(SECONDS_PER_YEAR);

    // weth lends at 3%, usdc at 5%
    let status = s.runtime.status().unwrap();
    let deployed = status.deployed.unwrap();
    assert_eq!(deployed.base, "1030");
    assert_eq!(deployed.quote, "2100");
    assert_eq!(status.depositors, 1);

    let handle = s
        .runtime
        .provision_market_making(
            s.agent,
            Amount::from_u64(1_030),
            Amount::from_u64(2_100),
            NodeConfig::default().default_params(),
        )
        .unwrap();

    let world = s.runtime.world();
    assert_eq!(world.orchestrator.phase(), OrchestratorPhase::InMarketMaking);
    assert_eq!(world.orchestrator.venue_handle(), Some(&handle));
    assert!(world.market_making.instance(&handle.id).unwrap().active);
    assert!(world
        .lending
        .ledger()
        .balance_of(&s.orchestrator, &s.weth, s.runtime.now())
        .is_zero());
}

#[test]
fn test_failed_switch_keeps_previous_venue() {
    let mut s = pooled();
    s.runtime
        .provision_lending(s.agent, Amount::from_u64(1_000), Amount::from_u64(2_000))
        .unwrap();
    s.runtime.advance(SECONDS_PER_YEAR);
    let before = s.runtime.world().clone();

    // custody plus the lending position cannot cover the request
    let err = s
        .runtime
        .provision_market_making(
            s.agent,
            Amount::from_u64(5_000),
            Amount::from_u64(2_000),
            NodeConfig::default().default_params(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Orchestrator(OrchestratorError::InsufficientBalance { .. })
    ));

    let world = s.runtime.world();
    assert_eq!(world.bank, before.bank);
    assert_eq!(world.lending, before.lending);
    assert_eq!(world.orchestrator, before.orchestrator);
    assert_eq!(world.orchestrator.current_venue(), Some(VenueKind::Lending));
}

#[test]
fn test_withdraw_gated_while_deployed() {
    let mut s = pooled();
    s.runtime
        .provision_lending(s.agent, Amount::from_u64(500), Amount::zero())
        .unwrap();

    let err = s
        .runtime
        .withdraw(s.alice, s.weth, Amount::from_u64(100))
        .unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Orchestrator(OrchestratorError::FundsDeployed(VenueKind::Lending))
    ));
}

#[test]
fn test_emergency_returns_everything_to_custody() {
    let mut s = pooled();
    s.runtime
        .provision_market_making(
            s.agent,
            Amount::from_u64(1_000),
            Amount::from_u64(2_000),
            NodeConfig::default().default_params(),
        )
        .unwrap();
    s.runtime.advance(SECONDS_PER_YEAR / 2);

    let report = s.runtime.emergency(s.agent).unwrap();
    assert!(report.is_clean());
    assert!(matches!(
        report.outcome(RecoveryAction::MarketMakingRetract),
        Some(StepOutcome::Recovered(_))
    ));
    assert_eq!(
        s.runtime.world().orchestrator.phase(),
        OrchestratorPhase::EmergencyIdle
    );
    assert!(s.runtime.balance_of(&s.weth, &s.orchestrator) >= Amount::from_u64(1_000));
    assert!(s.runtime.balance_of(&s.usdc, &s.orchestrator) >= Amount::from_u64(2_000));

    s.runtime
        .withdraw(s.alice, s.weth, Amount::from_u64(1_000))
        .unwrap();
    assert_eq!(s.runtime.balance_of(&s.weth, &s.alice), Amount::from_u64(10_000));
}

#[test]
fn test_direct_lending_and_redeem() {
    let mut s = pooled();
    let bob = label("bob");
    let ledger = label("lending-ledger");
    s.runtime.fund(bob, s.usdc, Amount::from_u64(1_000)).unwrap();
    s.runtime
        .approve(bob, s.usdc, ledger, Amount::from_u64(1_000))
        .unwrap();

    let shares = s.runtime.lend(bob, s.usdc, Amount::from_u64(1_000)).unwrap();
    assert_eq!(shares, Amount::from_u64(1_000));

    s.runtime.advance(SECONDS_PER_YEAR);
    let paid = s.runtime.redeem(bob, s.usdc, Amount::zero()).unwrap();
    assert_eq!(paid, Amount::from_u64(1_050));
    assert_eq!(s.runtime.balance_of(&s.usdc, &bob), Amount::from_u64(1_050));
}

#[test]
fn test_state_and_config_files_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config();
    config.data_dir = dir.path().join("data").to_string_lossy().into_owned();

    let config_path = dir.path().join("allocator.toml");
    let config_path = config_path.to_str().unwrap();
    config.to_file(config_path).unwrap();
    assert_eq!(NodeConfig::from_file(config_path).unwrap(), config);

    let mut s = pooled();
    s.runtime
        .provision_lending(s.agent, Amount::from_u64(1_000), Amount::zero())
        .unwrap();
    s.runtime.advance(3_600);
    s.runtime.save(&config.state_path()).unwrap();

    let restored = World::load(&config.state_path()).unwrap();
    assert_eq!(&restored, s.runtime.world());
    assert_eq!(Runtime::load(&config.state_path()).unwrap().now(), T0 + 3_600);
}
