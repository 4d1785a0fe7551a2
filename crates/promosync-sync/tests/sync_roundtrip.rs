use promosync_client::{ClientCall, ClientOperation, MemoryClient};
use promosync_core::ResourceType;
use promosync_sync::events::{ExclusionReason, Slot};
use promosync_sync::writer::{PLACEHOLDER_COUPON_CODE, PLACEHOLDER_EXPIRES_AT};
use promosync_sync::{
    execute_import, export_promotions, export_to_file, import_from_file, prepare_import, Action,
    Snapshot, Transcript, WriteOptions,
};
use serde_json::{json, Value};

fn market(id: &str, code: &str) -> Value {
    json!({ "id": id, "type": "markets", "code": code, "name": code })
}

fn sku_list(id: &str, name: &str) -> Value {
    json!({ "id": id, "type": "sku_lists", "name": name, "manual": true })
}

fn tag(id: &str, name: &str) -> Value {
    json!({ "id": id, "type": "tags", "name": name })
}

fn summer10(market_code: &str) -> Value {
    json!({
        "id": "src_promo_summer",
        "type": "percentage_discount_promotions",
        "name": "SUMMER10",
        "percentage": 10,
        "currency_code": "EUR",
        "starts_at": "2024-06-01T00:00:00Z",
        "expires_at": "2024-09-01T00:00:00Z",
        "active": true,
        "market": { "id": "src_mkt_eu", "type": "markets", "code": market_code }
    })
}

/// Active promotion carrying one rule of every kind.
fn vip_sunglasses() -> Value {
    json!({
        "id": "src_promo_vip",
        "type": "fixed_amount_promotions",
        "name": "VIPSUN",
        "fixed_amount_cents": 1500,
        "currency_code": "EUR",
        "active": true,
        "updated_at": "2024-07-01T10:00:00Z",
        "order_amount_promotion_rule": {
            "id": "src_rule_oa",
            "type": "order_amount_promotion_rules",
            "order_amount_cents": 5000,
            "use_subtotal": true
        },
        "sku_list_promotion_rule": {
            "id": "src_rule_sl",
            "type": "sku_list_promotion_rules",
            "min_quantity": 2,
            "all_skus": false,
            "sku_list": { "id": "src_sl_sun", "type": "sku_lists", "name": "Sunglasses" }
        },
        "coupon_codes_promotion_rule": {
            "id": "src_rule_cc",
            "type": "coupon_codes_promotion_rules",
            "reference": "vip-codes"
        },
        "custom_promotion_rule": {
            "id": "src_rule_cu",
            "type": "custom_promotion_rules",
            "filters": { "customer_tags_id_in": "src_tag_vip", "total_amount_cents_gt": 10000 }
        }
    })
}

fn vip_source() -> MemoryClient {
    MemoryClient::new()
        .with_items(ResourceType::FixedAmountPromotions, vec![vip_sunglasses()])
        .with_items(ResourceType::SkuLists, vec![sku_list("src_sl_sun", "Sunglasses")])
        .with_items(ResourceType::Tags, vec![tag("src_tag_vip", "VIP")])
}

fn vip_target() -> MemoryClient {
    MemoryClient::new()
        .with_items(
            ResourceType::SkuLists,
            vec![sku_list("tgt_sl_other", "Hats"), sku_list("tgt_sl_sun", "Sunglasses")],
        )
        .with_items(ResourceType::Tags, vec![tag("tgt_tag_vip", "VIP")])
}

fn position(writes: &[ClientCall], operation: ClientOperation, resource: ResourceType) -> usize {
    writes
        .iter()
        .position(|call| call.is(operation, resource))
        .unwrap_or_else(|| panic!("no {operation:?} on {resource}"))
}

#[tokio::test]
async fn summer10_is_created_disabled_on_the_target_eu_market() {
    let source = MemoryClient::new()
        .with_items(ResourceType::PercentageDiscountPromotions, vec![summer10("EU")])
        .with_items(ResourceType::Markets, vec![market("src_mkt_eu", "EU")]);
    let target = MemoryClient::new().with_items(
        ResourceType::Markets,
        vec![market("tgt_mkt_us", "US"), market("tgt_mkt_eu", "EU")],
    );
    let mut transcript = Transcript::new();

    let snapshot = export_promotions(&source, &mut transcript).await.unwrap();
    assert_eq!(snapshot.relationships_types, vec!["markets"]);

    let plan = prepare_import(&target, &snapshot, &mut transcript).await.unwrap();
    assert_eq!(plan.candidates.len(), 1);
    assert_eq!(plan.candidates[0].action, Action::Create);

    let summary = execute_import(&target, &plan, &[], WriteOptions::default(), &mut transcript).await;
    assert_eq!((summary.created, summary.updated, summary.failed), (1, 0, 0));

    let writes = target.writes().await;
    assert_eq!(writes.len(), 2);
    let create = &writes[0];
    assert!(create.is(ClientOperation::Create, ResourceType::PercentageDiscountPromotions));
    assert_eq!(create.attribute("_disable"), Some(&json!(true)));
    assert_eq!(create.attribute("name"), Some(&json!("SUMMER10")));
    let market_ref = create
        .payload
        .as_ref()
        .and_then(|payload| payload.relationships.get("market"))
        .unwrap();
    assert_eq!(market_ref.id, "tgt_mkt_eu");
    assert_eq!(writes[1].attribute("_enable"), Some(&json!(true)));

    let created = target.items(ResourceType::PercentageDiscountPromotions).await;
    assert_eq!(created[0]["market"]["code"], "EU");
    assert_eq!(created[0]["active"], true);
}

#[tokio::test]
async fn enable_comes_after_every_rule_write() {
    let source = vip_source();
    let target = vip_target();
    let mut transcript = Transcript::new();

    let snapshot = export_promotions(&source, &mut transcript).await.unwrap();
    assert_eq!(snapshot.relationships_types, vec!["sku_lists", "tags"]);
    let plan = prepare_import(&target, &snapshot, &mut transcript).await.unwrap();
    let summary = execute_import(&target, &plan, &[], WriteOptions::default(), &mut transcript).await;
    assert_eq!(summary.failed, 0, "{:?}", transcript.lines());

    let writes = target.writes().await;
    let kinds = writes.iter().map(|call| call.resource).collect::<Vec<_>>();
    assert_eq!(
        kinds,
        vec![
            ResourceType::FixedAmountPromotions,
            ResourceType::OrderAmountPromotionRules,
            ResourceType::SkuListPromotionRules,
            ResourceType::CouponCodesPromotionRules,
            ResourceType::Coupons,
            ResourceType::CustomPromotionRules,
            ResourceType::FixedAmountPromotions,
        ]
    );
    let enable = writes.len() - 1;
    assert_eq!(writes[enable].attribute("_enable"), Some(&json!(true)));
    assert!(writes[..enable]
        .iter()
        .all(|call| call.attribute("_enable").is_none()));

    let sku_rule = &writes[position(&writes, ClientOperation::Create, ResourceType::SkuListPromotionRules)];
    let sku_ref = sku_rule.payload.as_ref().unwrap();
    assert_eq!(sku_ref.relationships["sku_list"].id, "tgt_sl_sun");
    assert_eq!(sku_ref.relationships["promotion"].resource, ResourceType::FixedAmountPromotions);
    assert_eq!(sku_rule.attribute("min_quantity"), Some(&json!(2)));

    let custom = &writes[position(&writes, ClientOperation::Create, ResourceType::CustomPromotionRules)];
    assert_eq!(
        custom.attribute("filters"),
        Some(&json!({ "customer_tags_id_in": "tgt_tag_vip", "total_amount_cents_gt": 10000 }))
    );
}

#[tokio::test]
async fn placeholder_coupon_only_follows_a_new_coupon_rule() {
    let source = vip_source();
    let target = vip_target();
    let mut transcript = Transcript::new();
    let snapshot = export_promotions(&source, &mut transcript).await.unwrap();

    let plan = prepare_import(&target, &snapshot, &mut transcript).await.unwrap();
    let first = execute_import(&target, &plan, &[], WriteOptions::default(), &mut transcript).await;
    assert_eq!(first.placeholder_coupons, 1);

    let writes = target.writes().await;
    let rule = position(&writes, ClientOperation::Create, ResourceType::CouponCodesPromotionRules);
    let coupons = writes
        .iter()
        .enumerate()
        .filter(|(_, call)| call.resource == ResourceType::Coupons)
        .collect::<Vec<_>>();
    assert_eq!(coupons.len(), 1);
    let (at, coupon) = coupons[0];
    assert_eq!(at, rule + 1);
    assert_eq!(coupon.attribute("code"), Some(&json!(PLACEHOLDER_COUPON_CODE)));
    assert_eq!(coupon.attribute("usage_limit"), Some(&json!(1)));
    assert_eq!(coupon.attribute("expires_at"), Some(&json!(PLACEHOLDER_EXPIRES_AT)));

    // Second run finds everything in place and only updates.
    let already = target.writes().await.len();
    let plan = prepare_import(&target, &snapshot, &mut transcript).await.unwrap();
    assert_eq!(plan.candidates[0].action, Action::Update);
    let second = execute_import(&target, &plan, &[], WriteOptions::default(), &mut transcript).await;
    assert_eq!((second.created, second.updated, second.placeholder_coupons), (0, 1, 0));

    let rerun = target.writes().await.split_off(already);
    assert!(rerun.iter().all(|call| call.operation == ClientOperation::Update));
    assert!(rerun.iter().all(|call| call.resource != ResourceType::Coupons));
    assert_eq!(rerun[0].attribute("_disable"), None);
    assert_eq!(rerun.len(), 6);
}

#[tokio::test]
async fn one_failing_promotion_does_not_stop_the_rest() {
    let mut broken = summer10("EU");
    broken["id"] = json!("src_promo_broken");
    broken["name"] = json!("BROKEN");
    let source = MemoryClient::new()
        .with_items(ResourceType::PercentageDiscountPromotions, vec![broken, summer10("EU")])
        .with_items(ResourceType::Markets, vec![market("src_mkt_eu", "EU")]);
    let target = MemoryClient::new()
        .with_items(ResourceType::Markets, vec![market("tgt_mkt_eu", "EU")])
        .fail_on_named(ClientOperation::Create, "BROKEN", "name - has already been taken");
    let mut transcript = Transcript::new();

    let snapshot = export_promotions(&source, &mut transcript).await.unwrap();
    let plan = prepare_import(&target, &snapshot, &mut transcript).await.unwrap();
    let summary = execute_import(&target, &plan, &[], WriteOptions::default(), &mut transcript).await;

    assert_eq!((summary.attempted, summary.created, summary.failed), (2, 1, 1));
    assert_eq!(
        transcript.write_failures().collect::<Vec<_>>(),
        vec![("BROKEN", "name - has already been taken")]
    );
    let created = target.items(ResourceType::PercentageDiscountPromotions).await;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0]["name"], "SUMMER10");
}

#[tokio::test]
async fn unmatched_market_excludes_the_promotion() {
    let source = MemoryClient::new()
        .with_items(ResourceType::PercentageDiscountPromotions, vec![summer10("EU")])
        .with_items(ResourceType::Markets, vec![market("src_mkt_eu", "EU")]);
    let target = MemoryClient::new().with_items(ResourceType::Markets, vec![market("tgt_mkt_us", "US")]);
    let mut transcript = Transcript::new();

    let snapshot = export_promotions(&source, &mut transcript).await.unwrap();
    let plan = prepare_import(&target, &snapshot, &mut transcript).await.unwrap();

    assert!(plan.candidates.is_empty());
    assert_eq!(plan.excluded, 1);
    assert!(transcript.exclusions().any(|(name, reason)| name == "SUMMER10"
        && *reason
            == ExclusionReason::NotFoundInTarget {
                slot: Slot::Market,
                key: "EU".into()
            }));
    assert!(target.writes().await.is_empty());
}

#[tokio::test]
async fn rules_missing_from_the_source_are_deleted() {
    let source = MemoryClient::new().with_items(
        ResourceType::FreeShippingPromotions,
        vec![json!({ "id": "src_ship", "type": "free_shipping_promotions", "name": "SHIP", "active": false })],
    );
    let target_rule = json!({
        "id": "tgt_rule_oa",
        "type": "order_amount_promotion_rules",
        "order_amount_cents": 2000
    });
    let target = MemoryClient::new()
        .with_items(
            ResourceType::FreeShippingPromotions,
            vec![json!({
                "id": "tgt_ship",
                "type": "free_shipping_promotions",
                "name": "SHIP",
                "active": true,
                "order_amount_promotion_rule": target_rule.clone()
            })],
        )
        .with_items(ResourceType::OrderAmountPromotionRules, vec![target_rule]);
    let mut transcript = Transcript::new();

    let snapshot = export_promotions(&source, &mut transcript).await.unwrap();
    let plan = prepare_import(&target, &snapshot, &mut transcript).await.unwrap();
    let summary = execute_import(&target, &plan, &[], WriteOptions::default(), &mut transcript).await;
    assert_eq!((summary.updated, summary.enabled), (1, 0));

    let writes = target.writes().await;
    assert_eq!(writes.len(), 2);
    assert!(writes[0].is(ClientOperation::Update, ResourceType::FreeShippingPromotions));
    assert_eq!(writes[0].id.as_deref(), Some("tgt_ship"));
    assert!(writes[1].is(ClientOperation::Delete, ResourceType::OrderAmountPromotionRules));
    assert_eq!(writes[1].id.as_deref(), Some("tgt_rule_oa"));

    // Activation is left alone unless re-disabling is asked for.
    let shipped = target.items(ResourceType::FreeShippingPromotions).await;
    assert_eq!(shipped[0]["active"], true);

    let plan = prepare_import(&target, &snapshot, &mut transcript).await.unwrap();
    execute_import(
        &target,
        &plan,
        &[],
        WriteOptions {
            disable_inactive: true,
        },
        &mut transcript,
    )
    .await;
    let last = target.writes().await.pop().unwrap();
    assert_eq!(last.attribute("_disable"), Some(&json!(true)));
    let shipped = target.items(ResourceType::FreeShippingPromotions).await;
    assert_eq!(shipped[0]["active"], false);
}

#[tokio::test]
async fn snapshot_file_carries_a_selected_export_into_the_target() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");
    let mut winter = summer10("EU");
    winter["id"] = json!("src_promo_winter");
    winter["name"] = json!("WINTER20");
    let source = MemoryClient::new()
        .with_items(ResourceType::PercentageDiscountPromotions, vec![summer10("EU"), winter])
        .with_items(ResourceType::Markets, vec![market("src_mkt_eu", "EU")]);
    let target = MemoryClient::new().with_items(ResourceType::Markets, vec![market("tgt_mkt_eu", "EU")]);
    let mut transcript = Transcript::new();

    let exported = export_to_file(&source, &path, &["WINTER20".to_string()], &mut transcript)
        .await
        .unwrap();
    assert_eq!(exported.promotions, 1);

    let snapshot = Snapshot::read_from(&path).await.unwrap();
    assert_eq!(snapshot.promotions[0].name.as_deref(), Some("WINTER20"));
    assert!(snapshot.relationships_by_id.contains_key("src_mkt_eu"));

    let summary = import_from_file(&target, &path, &[], WriteOptions::default(), &mut transcript)
        .await
        .unwrap();
    assert_eq!(summary.created, 1);
    let created = target.items(ResourceType::PercentageDiscountPromotions).await;
    assert_eq!(created[0]["name"], "WINTER20");
}

#[tokio::test]
async fn import_selection_limits_what_is_written() {
    let mut winter = summer10("EU");
    winter["id"] = json!("src_promo_winter");
    winter["name"] = json!("WINTER20");
    let source = MemoryClient::new()
        .with_items(ResourceType::PercentageDiscountPromotions, vec![summer10("EU"), winter])
        .with_items(ResourceType::Markets, vec![market("src_mkt_eu", "EU")]);
    let target = MemoryClient::new().with_items(ResourceType::Markets, vec![market("tgt_mkt_eu", "EU")]);
    let mut transcript = Transcript::new();

    let snapshot = export_promotions(&source, &mut transcript).await.unwrap();
    let plan = prepare_import(&target, &snapshot, &mut transcript).await.unwrap();
    let selection = vec!["SUMMER10".to_string(), "AUTUMN".to_string()];
    let summary = execute_import(&target, &plan, &selection, WriteOptions::default(), &mut transcript).await;

    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.unmatched_selection, vec!["AUTUMN".to_string()]);
    let created = target.items(ResourceType::PercentageDiscountPromotions).await;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0]["name"], "SUMMER10");
}

#[tokio::test]
async fn update_clears_target_values_the_source_leaves_unset() {
    let mut source_promo = summer10("EU");
    let fields = source_promo.as_object_mut().unwrap();
    fields.remove("expires_at");
    let source = MemoryClient::new()
        .with_items(ResourceType::PercentageDiscountPromotions, vec![source_promo])
        .with_items(ResourceType::Markets, vec![market("src_mkt_eu", "EU")]);
    let target = MemoryClient::new()
        .with_items(
            ResourceType::PercentageDiscountPromotions,
            vec![json!({
                "id": "tgt_promo_summer",
                "type": "percentage_discount_promotions",
                "name": "SUMMER10",
                "percentage": 5,
                "expires_at": "2030-01-01T00:00:00Z",
                "reference": "stale",
                "total_usage_limit": 3,
                "market": { "id": "tgt_mkt_eu", "type": "markets", "code": "EU" }
            })],
        )
        .with_items(ResourceType::Markets, vec![market("tgt_mkt_eu", "EU")]);
    let mut transcript = Transcript::new();

    let snapshot = export_promotions(&source, &mut transcript).await.unwrap();
    let plan = prepare_import(&target, &snapshot, &mut transcript).await.unwrap();
    let summary = execute_import(&target, &plan, &[], WriteOptions::default(), &mut transcript).await;
    assert_eq!(summary.updated, 1);

    let writes = target.writes().await;
    assert!(writes[0].is(ClientOperation::Update, ResourceType::PercentageDiscountPromotions));
    assert_eq!(writes[0].attribute("expires_at"), Some(&Value::Null));

    let updated = target.items(ResourceType::PercentageDiscountPromotions).await;
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0]["percentage"], 10);
    assert!(updated[0]["expires_at"].is_null());
    assert!(updated[0]["reference"].is_null());
    assert!(updated[0]["total_usage_limit"].is_null());
}

#[tokio::test]
async fn uncomparable_target_namesake_is_updated_not_duplicated() {
    let source = MemoryClient::new().with_items(
        ResourceType::FreeShippingPromotions,
        vec![json!({ "id": "src_ship", "type": "free_shipping_promotions", "name": "SHIP" })],
    );
    let target = MemoryClient::new().with_items(
        ResourceType::FreeShippingPromotions,
        vec![json!({
            "id": "tgt_ship",
            "type": "free_shipping_promotions",
            "name": "SHIP",
            "sku_list": { "id": "tgt_sl_1", "type": "sku_lists", "name": null }
        })],
    );
    let mut transcript = Transcript::new();

    let snapshot = export_promotions(&source, &mut transcript).await.unwrap();
    let plan = prepare_import(&target, &snapshot, &mut transcript).await.unwrap();
    assert_eq!(plan.candidates[0].action, Action::Update);
    execute_import(&target, &plan, &[], WriteOptions::default(), &mut transcript).await;

    let promotions = target.items(ResourceType::Promotions).await;
    let names = promotions
        .iter()
        .map(|item| (item["id"].as_str().unwrap(), item["name"].as_str().unwrap()))
        .collect::<Vec<_>>();
    assert_eq!(names, vec![("tgt_ship", "SHIP")]);
}
