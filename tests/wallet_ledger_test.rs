mod common;

use common::TestApp;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use storefront_engine::{
    entities::TransactionKind,
    errors::ServiceError,
};
use uuid::Uuid;

#[tokio::test]
async fn balance_is_zero_before_any_transaction() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();

    assert_eq!(
        app.engine.wallet.balance(user_id).await.unwrap(),
        Decimal::ZERO
    );

    // History for a user with no wallet is a not-found, not an empty page.
    let err = app
        .engine
        .wallet
        .transaction_history(user_id, 1, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn every_row_chains_onto_the_previous_balance() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();

    app.engine
        .wallet
        .credit(user_id, dec!(50.00), "Signup bonus".to_string(), None)
        .await
        .unwrap();
    app.engine
        .wallet
        .debit(user_id, dec!(12.50), "Order payment".to_string(), None)
        .await
        .unwrap();
    app.engine
        .wallet
        .credit(user_id, dec!(3.75), "Delivery bonus".to_string(), None)
        .await
        .unwrap();
    app.engine
        .wallet
        .debit(user_id, dec!(1.25), "Order payment".to_string(), None)
        .await
        .unwrap();

    assert_eq!(
        app.engine.wallet.balance(user_id).await.unwrap(),
        dec!(40.00)
    );

    let (newest_first, total) = app
        .engine
        .wallet
        .transaction_history(user_id, 1, 50)
        .await
        .unwrap();
    assert_eq!(total, 4);
    assert_eq!(newest_first.len(), 4);

    // Oldest to newest, each row starts where the previous one ended and
    // the arithmetic inside every row holds.
    let mut rows = newest_first;
    rows.sort_by_key(|tx| tx.created_at);
    assert_eq!(rows[0].balance_before, Decimal::ZERO);
    for pair in rows.windows(2) {
        assert_eq!(pair[0].balance_after, pair[1].balance_before);
    }
    for tx in &rows {
        let expected = match tx.kind {
            TransactionKind::Credit => tx.balance_before + tx.amount,
            TransactionKind::Debit => tx.balance_before - tx.amount,
        };
        assert_eq!(tx.balance_after, expected);
    }
    assert_eq!(rows.last().unwrap().balance_after, dec!(40.00));
}

#[tokio::test]
async fn debit_beyond_balance_is_rejected_and_leaves_no_row() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();

    app.engine
        .wallet
        .credit(user_id, dec!(10.00), "Signup bonus".to_string(), None)
        .await
        .unwrap();

    let err = app
        .engine
        .wallet
        .debit(user_id, dec!(10.01), "Order payment".to_string(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InsufficientWalletBalance));

    assert_eq!(
        app.engine.wallet.balance(user_id).await.unwrap(),
        dec!(10.00)
    );
    let (rows, total) = app
        .engine
        .wallet
        .transaction_history(user_id, 1, 10)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(rows[0].kind, TransactionKind::Credit);
}

#[tokio::test]
async fn nonpositive_amounts_are_rejected() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();

    for amount in [Decimal::ZERO, dec!(-5.00)] {
        let err = app
            .engine
            .wallet
            .credit(user_id, amount, "Bad credit".to_string(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        let err = app
            .engine
            .wallet
            .debit(user_id, amount, "Bad debit".to_string(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }
}

#[tokio::test]
async fn get_or_create_is_idempotent() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();

    let first = app.engine.wallet.get_or_create_wallet(user_id).await.unwrap();
    let second = app.engine.wallet.get_or_create_wallet(user_id).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(first.balance, Decimal::ZERO);
}

#[tokio::test]
async fn history_is_paginated_newest_first() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();

    for i in 1..=5 {
        app.engine
            .wallet
            .credit(user_id, Decimal::from(i), format!("Credit {}", i), None)
            .await
            .unwrap();
    }

    let (page_one, total) = app
        .engine
        .wallet
        .transaction_history(user_id, 1, 2)
        .await
        .unwrap();
    assert_eq!(total, 5);
    assert_eq!(page_one.len(), 2);
    assert_eq!(page_one[0].amount, dec!(5));
    assert_eq!(page_one[1].amount, dec!(4));

    let (page_three, _) = app
        .engine
        .wallet
        .transaction_history(user_id, 3, 2)
        .await
        .unwrap();
    assert_eq!(page_three.len(), 1);
    assert_eq!(page_three[0].amount, dec!(1));
}
