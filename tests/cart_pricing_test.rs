mod common;

use common::{seed_product, TestApp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use storefront_engine::{
    errors::ServiceError,
    services::{AddItemInput, CreateCartInput, CreatePromoCodeInput},
};
use uuid::Uuid;

#[tokio::test]
async fn cart_totals_are_derived_from_items_and_promo() {
    let app = TestApp::new().await;
    let product_a = seed_product(&app, "Mug", dec!(10.00), 10).await;
    let product_b = seed_product(&app, "Coaster", dec!(5.00), 10).await;

    let cart = app
        .engine
        .carts
        .create_cart(CreateCartInput::default())
        .await
        .expect("create cart");

    app.engine
        .carts
        .add_item(
            cart.id,
            AddItemInput {
                product_id: product_a,
                quantity: 2,
            },
        )
        .await
        .expect("add first item");
    let view = app
        .engine
        .carts
        .add_item(
            cart.id,
            AddItemInput {
                product_id: product_b,
                quantity: 1,
            },
        )
        .await
        .expect("add second item");

    assert_eq!(view.pricing.subtotal, dec!(25.00));
    assert_eq!(view.pricing.discount, dec!(0.00));
    assert_eq!(view.pricing.total, dec!(25.00));
    assert_eq!(view.pricing.total_quantity, 3);

    app.engine
        .promo_codes
        .create_promo_code(CreatePromoCodeInput {
            code: "TENOFF".to_string(),
            discount_percent: dec!(10),
            expires_at: None,
            usage_limit: None,
            is_active: None,
        })
        .await
        .expect("create promo");

    let view = app
        .engine
        .carts
        .apply_promo_code(cart.id, "TENOFF")
        .await
        .expect("apply promo");

    assert_eq!(view.pricing.subtotal, dec!(25.00));
    assert_eq!(view.pricing.discount, dec!(2.50));
    assert_eq!(view.pricing.total, dec!(22.50));
    assert_eq!(view.pricing.total, view.pricing.subtotal - view.pricing.discount);
}

#[tokio::test]
async fn adding_the_same_product_merges_into_one_line() {
    let app = TestApp::new().await;
    let product_id = seed_product(&app, "Mug", dec!(4.25), 10).await;

    let cart = app
        .engine
        .carts
        .create_cart(CreateCartInput::default())
        .await
        .expect("create cart");

    for _ in 0..2 {
        app.engine
            .carts
            .add_item(
                cart.id,
                AddItemInput {
                    product_id,
                    quantity: 2,
                },
            )
            .await
            .expect("add item");
    }

    let view = app.engine.carts.get_cart(cart.id).await.expect("get cart");
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].quantity, 4);
    assert_eq!(view.pricing.subtotal, dec!(17.00));
}

#[tokio::test]
async fn captured_unit_price_survives_catalog_price_change() {
    let app = TestApp::new().await;
    let product_id = seed_product(&app, "Mug", dec!(10.00), 10).await;

    let cart = app
        .engine
        .carts
        .create_cart(CreateCartInput::default())
        .await
        .expect("create cart");
    app.engine
        .carts
        .add_item(
            cart.id,
            AddItemInput {
                product_id,
                quantity: 1,
            },
        )
        .await
        .expect("add item");

    // Raise the catalog price after the item was added.
    use sea_orm::{ActiveModelTrait, EntityTrait, Set};
    use storefront_engine::entities::{product, Product};
    let model = Product::find_by_id(product_id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    let mut active: product::ActiveModel = model.into();
    active.price = Set(dec!(99.00));
    active.update(&*app.db).await.unwrap();

    let view = app.engine.carts.get_cart(cart.id).await.expect("get cart");
    assert_eq!(view.pricing.subtotal, dec!(10.00));
}

#[tokio::test]
async fn update_and_remove_item() {
    let app = TestApp::new().await;
    let product_id = seed_product(&app, "Mug", dec!(3.00), 10).await;

    let cart = app
        .engine
        .carts
        .create_cart(CreateCartInput::default())
        .await
        .expect("create cart");
    let view = app
        .engine
        .carts
        .add_item(
            cart.id,
            AddItemInput {
                product_id,
                quantity: 1,
            },
        )
        .await
        .expect("add item");
    let item_id = view.items[0].id;

    let view = app
        .engine
        .carts
        .update_item_quantity(cart.id, item_id, 5)
        .await
        .expect("update quantity");
    assert_eq!(view.pricing.subtotal, dec!(15.00));

    let view = app
        .engine
        .carts
        .remove_item(cart.id, item_id)
        .await
        .expect("remove item");
    assert!(view.items.is_empty());
    assert_eq!(view.pricing.total, Decimal::ZERO);
}

#[tokio::test]
async fn promo_snapshot_is_frozen_at_apply_time() {
    let app = TestApp::new().await;
    let product_id = seed_product(&app, "Mug", dec!(100.00), 10).await;

    let promo = app
        .engine
        .promo_codes
        .create_promo_code(CreatePromoCodeInput {
            code: "SAVE10".to_string(),
            discount_percent: dec!(10),
            expires_at: None,
            usage_limit: None,
            is_active: None,
        })
        .await
        .expect("create promo");

    let cart = app
        .engine
        .carts
        .create_cart(CreateCartInput::default())
        .await
        .expect("create cart");
    app.engine
        .carts
        .add_item(
            cart.id,
            AddItemInput {
                product_id,
                quantity: 1,
            },
        )
        .await
        .expect("add item");
    app.engine
        .carts
        .apply_promo_code(cart.id, "SAVE10")
        .await
        .expect("apply promo");

    // Admin changes the code's percentage afterwards.
    app.engine
        .promo_codes
        .update_promo_code(
            promo.id,
            storefront_engine::services::UpdatePromoCodeInput {
                discount_percent: Some(dec!(50)),
                ..Default::default()
            },
        )
        .await
        .expect("update promo");

    // The cart keeps the percentage captured at apply time.
    let view = app.engine.carts.get_cart(cart.id).await.expect("get cart");
    assert_eq!(view.pricing.discount, dec!(10.00));
}

#[tokio::test]
async fn removing_promo_clears_the_snapshot() {
    let app = TestApp::new().await;
    let product_id = seed_product(&app, "Mug", dec!(20.00), 10).await;

    app.engine
        .promo_codes
        .create_promo_code(CreatePromoCodeInput {
            code: "SAVE10".to_string(),
            discount_percent: dec!(10),
            expires_at: None,
            usage_limit: None,
            is_active: None,
        })
        .await
        .expect("create promo");

    let cart = app
        .engine
        .carts
        .create_cart(CreateCartInput::default())
        .await
        .expect("create cart");
    app.engine
        .carts
        .add_item(
            cart.id,
            AddItemInput {
                product_id,
                quantity: 1,
            },
        )
        .await
        .expect("add item");
    app.engine
        .carts
        .apply_promo_code(cart.id, "SAVE10")
        .await
        .expect("apply promo");

    let view = app
        .engine
        .carts
        .remove_promo_code(cart.id)
        .await
        .expect("remove promo");
    assert!(view.cart.promo_code_id.is_none());
    assert!(view.cart.promo_discount_percent.is_none());
    assert_eq!(view.pricing.discount, Decimal::ZERO);
    assert_eq!(view.pricing.total, dec!(20.00));
}

#[tokio::test]
async fn applying_an_unknown_code_fails() {
    let app = TestApp::new().await;
    let cart = app
        .engine
        .carts
        .create_cart(CreateCartInput::default())
        .await
        .expect("create cart");

    let err = app
        .engine
        .carts
        .apply_promo_code(cart.id, "NOPE")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::PromoNotFound));
}

#[tokio::test]
async fn rejects_nonpositive_quantity_and_unknown_product() {
    let app = TestApp::new().await;
    let cart = app
        .engine
        .carts
        .create_cart(CreateCartInput::default())
        .await
        .expect("create cart");

    let err = app
        .engine
        .carts
        .add_item(
            cart.id,
            AddItemInput {
                product_id: Uuid::new_v4(),
                quantity: 0,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));

    let err = app
        .engine
        .carts
        .add_item(
            cart.id,
            AddItemInput {
                product_id: Uuid::new_v4(),
                quantity: 1,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}
