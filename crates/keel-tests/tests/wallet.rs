//! Wallet manager scenarios across the wallet and router crates.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use keel_core::{Asset, ChainFamily, ProviderError, TxRequest};
use keel_router::testing::{PriceTable, StaticBalances, StaticPrices};
use keel_tests::helpers::*;
use keel_wallet::{AgentWalletManager, SeedManager, WalletError};

fn abandon_manager(balances: StaticBalances) -> AgentWalletManager {
    let m = AgentWalletManager::from_phrase(ABANDON, Arc::new(balances)).unwrap();
    m.initialize().unwrap();
    m
}

#[test]
fn known_mnemonic_derives_known_addresses() {
    let m = abandon_manager(StaticBalances::new());
    assert_eq!(m.address(ChainFamily::Evm).unwrap(), ABANDON_EVM);
    assert_eq!(m.address(ChainFamily::Utxo).unwrap(), ABANDON_UTXO);
}

#[test]
fn phrase_case_and_spacing_do_not_change_addresses() {
    let messy = format!("  {}  ", ABANDON.to_uppercase().replace(' ', "   "));
    let m = AgentWalletManager::from_phrase(&messy, Arc::new(StaticBalances::new())).unwrap();
    m.initialize().unwrap();
    assert_eq!(m.address(ChainFamily::Evm).unwrap(), ABANDON_EVM);
}

#[test]
fn invalid_mnemonic_is_rejected() {
    let result = AgentWalletManager::from_phrase(
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon",
        Arc::new(StaticBalances::new()),
    );
    assert!(matches!(result, Err(WalletError::InvalidMnemonic(_))));
}

#[test]
fn exported_phrase_restores_the_same_wallets() {
    let original = AgentWalletManager::generate(Arc::new(StaticBalances::new()));
    original.initialize().unwrap();
    let export = original.export_security();
    assert_eq!(export.mnemonic.split_whitespace().count(), 12);
    assert!(!format!("{export:?}").contains(export.mnemonic.as_str()));

    let restored = AgentWalletManager::from_phrase(&export.mnemonic, Arc::new(StaticBalances::new())).unwrap();
    restored.initialize().unwrap();
    for family in ChainFamily::ALL {
        assert_eq!(original.address(family).unwrap(), restored.address(family).unwrap());
    }
}

#[test]
fn generated_mnemonics_differ() {
    let a = SeedManager::generate();
    let b = SeedManager::generate();
    assert_ne!(*a.phrase(), *b.phrase());
}

#[test]
fn operations_before_initialize_fail() {
    let m = AgentWalletManager::from_phrase(ABANDON, Arc::new(StaticBalances::new())).unwrap();
    assert_eq!(m.address(ChainFamily::Evm), Err(WalletError::NotInitialized));
    m.initialize().unwrap();
    m.initialize().unwrap();
    assert_eq!(m.address(ChainFamily::Evm).unwrap(), ABANDON_EVM);
}

#[tokio::test]
async fn wallets_refresh_balances() {
    let balances = StaticBalances::new()
        .with_balance(ChainFamily::Evm, dec(3))
        .with_balance(ChainFamily::Utxo, Decimal::new(5, 1));
    let m = abandon_manager(balances);
    let wallets = m.wallets().await.unwrap();
    assert_eq!(wallets.len(), 2);
    assert_eq!(wallets[0].address, ABANDON_EVM);
    assert_eq!(wallets[0].cached_balance, dec(3));
    assert_eq!(wallets[1].address, ABANDON_UTXO);
    assert_eq!(wallets[1].cached_balance, Decimal::new(5, 1));
}

#[tokio::test]
async fn slow_balance_source_times_out() {
    let balances = StaticBalances::new().with_latency(Duration::from_millis(300));
    let m = abandon_manager(balances).with_balance_timeout(Duration::from_millis(20));
    let err = m.wallets().await.unwrap_err();
    assert!(matches!(err, WalletError::Balance(ProviderError::Timeout { .. })));
}

#[tokio::test]
async fn portfolio_value_reports_unpriced_assets() {
    let balances = StaticBalances::new()
        .with_balance(ChainFamily::Evm, dec(2))
        .with_balance(ChainFamily::Utxo, dec(1));
    let m = abandon_manager(balances);
    m.wallets().await.unwrap();

    let prices = StaticPrices::new(PriceTable::default());
    let value = m.portfolio_value(&prices).await.unwrap();
    assert_eq!(value.total, dec(66_000));
    assert!(value.unpriced.is_empty());

    let eth_only = StaticPrices::new(PriceTable::default().without("BTC"));
    let value = m.portfolio_value(&eth_only).await.unwrap();
    assert_eq!(value.total, dec(6_000));
    assert_eq!(value.priced, vec![(ChainFamily::Evm, dec(6_000))]);
    assert_eq!(value.unpriced, vec![Asset::new("BTC")]);
}

#[test]
fn each_family_signs_only_its_own_requests() {
    let m = abandon_manager(StaticBalances::new());
    let evm_tx = TxRequest::new(
        ChainFamily::Evm,
        Some(1),
        "0x000000000000000000000000000000000000dEaD",
        Asset::new("ETH"),
        Decimal::ONE,
    );
    let utxo_tx = TxRequest::new(ChainFamily::Utxo, None, ABANDON_UTXO, Asset::new("BTC"), Decimal::ONE);

    let evm = m.sign(ChainFamily::Evm, &evm_tx).unwrap();
    assert_eq!(evm.signature.len(), 65);
    assert!(evm.hash.starts_with("0x"));

    let utxo = m.sign(ChainFamily::Utxo, &utxo_tx).unwrap();
    assert_eq!(*utxo.signature.last().unwrap(), 0x01);
    assert_eq!(utxo.hash.len(), 64);

    assert!(m.sign(ChainFamily::Utxo, &evm_tx).is_err());
    assert_eq!(m.sign(ChainFamily::Evm, &evm_tx).unwrap(), evm);
}

#[test]
fn address_validation_is_per_family() {
    let m = abandon_manager(StaticBalances::new());
    assert!(m.is_valid_address(ChainFamily::Evm, ABANDON_EVM).unwrap());
    assert!(!m.is_valid_address(ChainFamily::Evm, ABANDON_UTXO).unwrap());
    assert!(m.is_valid_address(ChainFamily::Utxo, ABANDON_UTXO).unwrap());
    assert!(!m.is_valid_address(ChainFamily::Utxo, ABANDON_EVM).unwrap());
}
