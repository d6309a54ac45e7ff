//! # Checkout Orchestrator
//!
//! Turns carts into orders and drives orders through payment, cancellation,
//! refund and fulfillment.
//!
//! ## Checkout Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        checkout(request, at)                            │
//! │                                                                         │
//! │  validate customer + destination                                        │
//! │     │                                                                   │
//! │  BEGIN ─────────────────────────────────────────────────────────────┐   │
//! │  │  load catalog snapshot ──► compose summary ──► expected_total?   │   │
//! │  │                                                                  │   │
//! │  │  per line:  stock decrement (conditional)  + StockLog            │   │
//! │  │             flash sale claim (conditional) + purchase row        │   │
//! │  │  coupon:    usage counter (conditional)    + usage row           │   │
//! │  │  insert order + items (pending / payment_pending)                │   │
//! │  │  gateway charge token (bounded by collaborator timeout)          │   │
//! │  │  store token                                                     │   │
//! │  COMMIT ◄─── any error above drops the transaction (ROLLBACK) ──────┘   │
//! │     │                                                                   │
//! │  notify OrderCreated (best effort)                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle
//! ```text
//!   Pending ──paid──► Confirmed ──► Processing ──► Shipped ──► Delivered
//!      │                  │             │
//!      └── failed/cancel ─┴─── cancel ──┘──► Cancelled
//!
//!   payment Paid ──refund──► order Refunded, payment Refunded
//! ```
//!
//! Every mutation runs in one SQLite transaction. Counters are conditional
//! `UPDATE`s in the store, so two processes checking out the last unit
//! cannot both win.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::CheckoutConfig;
use crate::error::{CheckoutError, CheckoutResult};
use crate::gateway::{ChargeRequest, PaymentGateway, PaymentNotification, SignatureVerifier};
use crate::notify::{NotificationDispatcher, NotificationKind};
use orderline_core::order::{check_cancel, check_fulfillment, InvalidTransition, OrderWithItems};
use orderline_core::payment::{self, RejectReason};
use orderline_core::{
    CustomerInfo, CustomerTier, ItemRequest, Money, Order, OrderItem, OrderStatus, OrderSummary,
    CatalogSnapshot, PaymentSignal, PaymentStatus, PricingConfig, PricingError, QuoteRequest,
    ShippingError, ShippingRateProvider, ShippingRequest, StockLog, StockReason, SummaryComposer, Transition, ValidationError,
};
use orderline_db::repository::{catalog, coupon, order as orders, stock};
use orderline_db::{Database, DbError, FlashClaimOutcome, RedeemOutcome, SqliteConnection, StockMovement};

// =============================================================================
// Requests & Outcomes
// =============================================================================

/// A cart submitted for checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub items: Vec<ItemRequest>,
    #[serde(default)]
    pub tier: CustomerTier,
    #[serde(default)]
    pub coupon_code: Option<String>,
    /// Signed-in customer; `None` checks out as a guest.
    #[serde(default)]
    pub user_id: Option<String>,
    pub customer: CustomerInfo,
    /// Destination city code.
    pub destination: String,
    /// Grand total the customer was shown, if the client sends it.
    #[serde(default)]
    pub expected_total: Option<Money>,
}

impl CheckoutRequest {
    pub fn new(items: Vec<ItemRequest>, customer: CustomerInfo, destination: impl Into<String>) -> Self {
        Self {
            items,
            tier: CustomerTier::Retail,
            coupon_code: None,
            user_id: None,
            customer,
            destination: destination.into(),
            expected_total: None,
        }
    }

    pub fn with_tier(mut self, tier: CustomerTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_coupon(mut self, code: impl Into<String>) -> Self {
        self.coupon_code = Some(code.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn expecting(mut self, total: Money) -> Self {
        self.expected_total = Some(total);
        self
    }

    /// The pricing question this checkout asks, shipped from `origin`.
    pub fn quote_request(&self, origin: &str) -> QuoteRequest {
        QuoteRequest {
            items: self.items.clone(),
            shipping: ShippingRequest::new(origin, self.destination.clone()),
            tier: self.tier,
            coupon_code: self.coupon_code.clone(),
            user_id: self.user_id.clone(),
        }
    }
}

/// A placed order, ready for the customer to pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutReceipt {
    pub order: OrderWithItems,
    pub summary: OrderSummary,
    pub payment_token: String,
    pub redirect_url: Option<String>,
}

/// What a payment notification did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotificationOutcome {
    Applied {
        payment_status: PaymentStatus,
        order_status: OrderStatus,
    },
    /// Already in the notified state; nothing changed.
    Duplicate,
}

/// External services the orchestrator calls.
#[derive(Clone)]
pub struct Collaborators {
    pub shipping: Arc<dyn ShippingRateProvider>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub verifier: Arc<dyn SignatureVerifier>,
    pub notifier: Arc<dyn NotificationDispatcher>,
}

// =============================================================================
// Service
// =============================================================================

/// Checkout orchestrator.
///
/// Cloning is cheap: clones share the pool and the collaborators.
#[derive(Clone)]
pub struct CheckoutService {
    db: Database,
    pricing: PricingConfig,
    origin: String,
    timeout: Duration,
    shipping: Arc<dyn ShippingRateProvider>,
    gateway: Arc<dyn PaymentGateway>,
    verifier: Arc<dyn SignatureVerifier>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl CheckoutService {
    /// Builds a service from an already validated configuration.
    pub fn new(db: Database, config: &CheckoutConfig, collaborators: Collaborators) -> Self {
        Self {
            db,
            pricing: config.pricing_config(),
            origin: config.shipping.origin.clone(),
            timeout: config.collaborator_timeout(),
            shipping: collaborators.shipping,
            gateway: collaborators.gateway,
            verifier: collaborators.verifier,
            notifier: collaborators.notifier,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Origin city every parcel ships from.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    // =========================================================================
    // Quote
    // =========================================================================

    /// Prices a cart without writing anything.
    pub async fn quote(&self, request: &QuoteRequest, at: DateTime<Utc>) -> CheckoutResult<OrderSummary> {
        let snapshot = self.db.catalog().load_snapshot(request).await?;
        let summary = self.compose(snapshot, request, at).await?;

        debug!(
            lines = summary.lines.len(),
            grand_total = %summary.grand_total,
            "Quote computed"
        );
        Ok(summary)
    }

    /// Runs the composer on the blocking pool so a stuck shipping provider
    /// costs at most the collaborator timeout.
    ///
    /// The provider thread is left to finish on its own after a timeout.
    async fn compose(
        &self,
        snapshot: CatalogSnapshot,
        request: &QuoteRequest,
        at: DateTime<Utc>,
    ) -> CheckoutResult<OrderSummary> {
        let pricing = self.pricing.clone();
        let shipping = Arc::clone(&self.shipping);
        let request = request.clone();
        let task = tokio::task::spawn_blocking(move || {
            SummaryComposer::new(&snapshot, &pricing, &*shipping).compose(&request, at)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(summary)) => Ok(summary?),
            Ok(Err(e)) => Err(PricingError::Shipping(ShippingError::Unavailable(e.to_string())).into()),
            Err(_) => {
                warn!(
                    timeout_secs = self.timeout.as_secs(),
                    "Shipping provider did not answer in time"
                );
                Err(PricingError::Shipping(ShippingError::Timeout(self.timeout.as_secs())).into())
            }
        }
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Places an order: reserves stock and promotions, stores the order and
    /// opens a charge with the payment gateway, all or nothing.
    ///
    /// ## Errors
    /// - `Validation` / `Pricing`: bad input, unknown products, ineligible coupon
    /// - `QuoteMismatch`: `expected_total` differs from the recomputed total
    /// - `InsufficientStock`, `FlashSaleSoldOut`, `FlashSaleUserLimitExceeded`
    /// - `Pricing(CouponUsageExceeded | CouponUserLimitExceeded)`: lost a coupon race
    /// - `Gateway` / `CollaboratorTimeout`: retryable, nothing was written
    pub async fn checkout(&self, request: &CheckoutRequest, at: DateTime<Utc>) -> CheckoutResult<CheckoutReceipt> {
        request.customer.validate()?;
        if request.destination.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "destination".to_string(),
            }
            .into());
        }

        let quote_request = request.quote_request(&self.origin);
        let mut tx = self.db.begin_immediate().await?;

        let snapshot = catalog::load_snapshot(&mut tx, &quote_request).await?;
        let summary = self.compose(snapshot, &quote_request, at).await?;

        if let Some(expected) = request.expected_total {
            if expected != summary.grand_total {
                return Err(CheckoutError::QuoteMismatch {
                    expected,
                    actual: summary.grand_total,
                });
            }
        }

        let order_number = orders::generate_order_number(at);
        let user_id = request.user_id.as_deref();

        // 1. Stock and flash sales
        for line in &summary.lines {
            let movement = StockMovement::new(line.product_id.clone(), line.variant_id.clone(), line.quantity);
            if stock::decrement(&mut tx, &movement, &order_number, at).await?.is_none() {
                let available =
                    stock::available(&mut tx, &line.product_id, line.variant_id.as_deref()).await?;
                return Err(CheckoutError::InsufficientStock {
                    product_id: line.product_id.clone(),
                    variant_id: line.variant_id.clone(),
                    requested: line.quantity,
                    available,
                });
            }

            if let Some(flash_sale_id) = &line.flash_sale_id {
                match catalog::claim_flash_sale(&mut tx, flash_sale_id, user_id, line.quantity, &order_number, at)
                    .await?
                {
                    FlashClaimOutcome::Claimed => {}
                    FlashClaimOutcome::SoldOut => {
                        return Err(CheckoutError::FlashSaleSoldOut {
                            flash_sale_id: flash_sale_id.clone(),
                        })
                    }
                    FlashClaimOutcome::UserLimitExceeded => {
                        return Err(CheckoutError::FlashSaleUserLimitExceeded {
                            flash_sale_id: flash_sale_id.clone(),
                        })
                    }
                }
            }
        }

        // 2. Coupon
        if let Some(applied) = &summary.coupon {
            match coupon::redeem(&mut tx, &applied.coupon_id, user_id, &order_number, at).await? {
                RedeemOutcome::Redeemed => {}
                RedeemOutcome::UsageExceeded => {
                    return Err(PricingError::CouponUsageExceeded(applied.code.clone()).into())
                }
                RedeemOutcome::UserLimitExceeded => {
                    return Err(PricingError::CouponUserLimitExceeded(applied.code.clone()).into())
                }
            }
        }

        // 3. Order rows
        let mut order = build_order(&order_number, request, &quote_request, &summary, at);
        let items = build_items(&order.id, &summary);
        orders::insert_order(&mut tx, &order).await?;
        orders::insert_items(&mut tx, &items).await?;

        // 4. Charge
        let charge = ChargeRequest {
            order_number: order_number.clone(),
            amount: summary.grand_total,
            customer: request.customer.clone(),
        };
        let token = match tokio::time::timeout(self.timeout, self.gateway.create_charge_token(&charge)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(CheckoutError::CollaboratorTimeout {
                    collaborator: "payment gateway",
                    secs: self.timeout.as_secs(),
                })
            }
        };
        orders::set_payment_token(&mut tx, &order.id, &token.token, token.redirect_url.as_deref(), at).await?;

        tx.commit().await.map_err(DbError::from)?;

        order.payment_token = Some(token.token.clone());
        order.payment_redirect_url = token.redirect_url.clone();

        info!(
            order_number = %order.order_number,
            total = %order.grand_total,
            lines = items.len(),
            coupon = ?order.coupon_code,
            "Order placed"
        );

        let order = OrderWithItems { order, items };
        self.dispatch(&order, NotificationKind::OrderCreated);

        Ok(CheckoutReceipt {
            order,
            summary,
            payment_token: token.token,
            redirect_url: token.redirect_url,
        })
    }

    // =========================================================================
    // Payment Notifications
    // =========================================================================

    /// Applies a gateway payment notification.
    ///
    /// Duplicates are no-ops. Stale or conflicting events, unknown orders and
    /// amount mismatches are logged, rejected, and change nothing.
    pub async fn process_payment_notification(
        &self,
        notification: &PaymentNotification,
    ) -> CheckoutResult<NotificationOutcome> {
        let order_number = notification.order_number.as_str();

        if !self.verifier.verify(notification) {
            warn!(order_number, "Payment notification signature rejected");
            return Err(CheckoutError::InvalidSignature {
                order_number: order_number.to_string(),
            });
        }

        let Some(signal) = PaymentSignal::from_gateway_status(&notification.status) else {
            warn!(order_number, status = %notification.status, "Unknown payment status");
            return Err(CheckoutError::UnknownPaymentStatus(notification.status.clone()));
        };

        let at = Utc::now();
        let mut tx = self.db.begin_immediate().await?;

        let Some(order) = orders::find_by_number(&mut tx, order_number).await? else {
            warn!(order_number, "Payment notification for unknown order dropped");
            return Err(CheckoutError::OrderNotFound(order_number.to_string()));
        };

        if let Some(notified) = notification.gross_amount {
            if notified != order.grand_total {
                warn!(
                    order_number,
                    notified = %notified,
                    expected = %order.grand_total,
                    "Payment notification amount mismatch"
                );
                return Err(CheckoutError::AmountMismatch {
                    order_number: order_number.to_string(),
                    notified,
                    expected: order.grand_total,
                });
            }
        }

        let update = match payment::apply(order.status, order.payment_status, signal) {
            Transition::NoOp => {
                debug!(order_number, payment_status = %order.payment_status, "Duplicate payment notification");
                return Ok(NotificationOutcome::Duplicate);
            }
            Transition::Rejected(reason) => {
                warn!(
                    order_number,
                    current = %order.payment_status,
                    signal = %signal.target(),
                    reason = ?reason,
                    "Payment notification rejected"
                );
                return Err(match reason {
                    RejectReason::Stale => CheckoutError::StaleEvent {
                        order_number: order_number.to_string(),
                        current: order.payment_status,
                        signal: signal.target(),
                    },
                    RejectReason::Conflict => CheckoutError::ConflictingEvent {
                        order_number: order_number.to_string(),
                        current: order.payment_status,
                        signal: signal.target(),
                        order_status: order.status,
                    },
                });
            }
            Transition::Apply(update) => update,
        };

        if !orders::apply_payment_update(&mut tx, &order.id, order.payment_status, &update, at).await? {
            warn!(order_number, "Payment status changed concurrently; notification skipped");
            return Ok(NotificationOutcome::Duplicate);
        }

        if update.restore_stock {
            let items = orders::items_for(&mut tx, &order.id).await?;
            restore_items(&mut tx, &items, StockReason::PaymentFailedRestore, order_number, at).await?;
        }

        let updated = load_order(&mut tx, order_number).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!(
            order_number,
            payment_status = %update.payment_status,
            order_status = %update.order_status,
            "Payment notification applied"
        );

        let kind = if update.payment_status == PaymentStatus::Paid {
            NotificationKind::PaymentReceived
        } else {
            NotificationKind::PaymentFailed
        };
        self.dispatch(&updated, kind);

        Ok(NotificationOutcome::Applied {
            payment_status: update.payment_status,
            order_status: update.order_status,
        })
    }

    // =========================================================================
    // Cancel & Refund
    // =========================================================================

    /// Cancels an order and puts its units back on the shelf.
    ///
    /// Payment status is left as is; a paid order still needs [`refund`](Self::refund).
    pub async fn cancel(&self, order_number: &str, reason: Option<&str>) -> CheckoutResult<OrderWithItems> {
        let at = Utc::now();
        let mut tx = self.db.begin_immediate().await?;

        let order = require_order(&mut tx, order_number).await?;
        check_cancel(order.status)?;

        if !orders::mark_cancelled(&mut tx, &order.id, order.status, reason, at).await? {
            return Err(InvalidTransition {
                from: order.status,
                to: OrderStatus::Cancelled,
            }
            .into());
        }

        let items = orders::items_for(&mut tx, &order.id).await?;
        restore_items(&mut tx, &items, StockReason::Cancelled, order_number, at).await?;

        let updated = load_order(&mut tx, order_number).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!(order_number, from = %order.status, reason = ?reason, "Order cancelled");
        self.dispatch(&updated, NotificationKind::OrderCancelled);
        Ok(updated)
    }

    /// Refunds a paid order.
    ///
    /// Stock comes back unless a cancellation already returned it.
    pub async fn refund(&self, order_number: &str) -> CheckoutResult<OrderWithItems> {
        let at = Utc::now();
        let mut tx = self.db.begin_immediate().await?;

        let order = require_order(&mut tx, order_number).await?;
        if order.payment_status != PaymentStatus::Paid {
            return Err(CheckoutError::NotRefundable {
                order_number: order_number.to_string(),
                payment_status: order.payment_status,
            });
        }

        if order.status != OrderStatus::Cancelled {
            let items = orders::items_for(&mut tx, &order.id).await?;
            restore_items(&mut tx, &items, StockReason::Refunded, order_number, at).await?;
        }

        if !orders::mark_refunded(&mut tx, &order.id, at).await? {
            return Err(CheckoutError::NotRefundable {
                order_number: order_number.to_string(),
                payment_status: order.payment_status,
            });
        }

        let updated = load_order(&mut tx, order_number).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!(order_number, total = %order.grand_total, "Order refunded");
        self.dispatch(&updated, NotificationKind::OrderRefunded);
        Ok(updated)
    }

    // =========================================================================
    // Fulfillment & Queries
    // =========================================================================

    /// Moves a confirmed order one fulfillment step forward.
    pub async fn advance_fulfillment(&self, order_number: &str, to: OrderStatus) -> CheckoutResult<OrderWithItems> {
        let at = Utc::now();
        let mut tx = self.db.begin_immediate().await?;

        let order = require_order(&mut tx, order_number).await?;
        check_fulfillment(order.status, to)?;

        if !orders::advance_status(&mut tx, &order.id, order.status, to, at).await? {
            return Err(InvalidTransition { from: order.status, to }.into());
        }

        let updated = load_order(&mut tx, order_number).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!(order_number, from = %order.status, to = %to, "Fulfillment advanced");
        self.dispatch(&updated, NotificationKind::FulfillmentUpdated);
        Ok(updated)
    }

    pub async fn get_order(&self, order_number: &str) -> CheckoutResult<OrderWithItems> {
        self.db
            .orders()
            .get_with_items(order_number)
            .await?
            .ok_or_else(|| CheckoutError::OrderNotFound(order_number.to_string()))
    }

    /// Stock ledger entries written on behalf of an order.
    pub async fn stock_history(&self, order_number: &str) -> CheckoutResult<Vec<StockLog>> {
        Ok(self.db.stock().history(order_number).await?)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Hands the notification to a background task; the caller never waits.
    fn dispatch(&self, order: &OrderWithItems, kind: NotificationKind) {
        let notifier = Arc::clone(&self.notifier);
        let timeout = self.timeout;
        let order = order.clone();
        tokio::spawn(async move {
            let order_number = order.order.order_number.as_str();
            match tokio::time::timeout(timeout, notifier.notify(&order, kind)).await {
                Ok(Ok(())) => debug!(order_number, kind = ?kind, "Notification dispatched"),
                Ok(Err(e)) => warn!(order_number, kind = ?kind, error = %e, "Notification failed"),
                Err(_) => warn!(
                    order_number,
                    kind = ?kind,
                    secs = timeout.as_secs(),
                    "Notification timed out"
                ),
            }
        });
    }
}

async fn require_order(conn: &mut SqliteConnection, order_number: &str) -> CheckoutResult<Order> {
    orders::find_by_number(conn, order_number)
        .await?
        .ok_or_else(|| CheckoutError::OrderNotFound(order_number.to_string()))
}

async fn load_order(conn: &mut SqliteConnection, order_number: &str) -> CheckoutResult<OrderWithItems> {
    let order = require_order(conn, order_number).await?;
    let items = orders::items_for(conn, &order.id).await?;
    Ok(OrderWithItems { order, items })
}

/// Returns every item's units and releases the order's flash-sale claims.
async fn restore_items(
    conn: &mut SqliteConnection,
    items: &[OrderItem],
    reason: StockReason,
    order_number: &str,
    at: DateTime<Utc>,
) -> CheckoutResult<()> {
    for item in items {
        let movement = StockMovement::new(item.product_id.clone(), item.variant_id.clone(), item.quantity);
        stock::restore(conn, &movement, reason, order_number, at).await?;
    }
    catalog::release_flash_sales(conn, order_number, at).await?;

    debug!(order_number, items = items.len(), reason = %reason, "Stock restored");
    Ok(())
}

fn build_order(
    order_number: &str,
    request: &CheckoutRequest,
    quote: &QuoteRequest,
    summary: &OrderSummary,
    at: DateTime<Utc>,
) -> Order {
    Order {
        id: orders::generate_order_id(),
        order_number: order_number.to_string(),
        user_id: request.user_id.clone(),
        tier: request.tier,
        customer_name: request.customer.name.trim().to_string(),
        customer_phone: request.customer.phone.trim().to_string(),
        customer_email: request.customer.email.clone(),
        shipping_address: request.customer.address.trim().to_string(),
        shipping_origin: quote.shipping.origin.clone(),
        shipping_destination: quote.shipping.destination.clone(),
        status: OrderStatus::Pending,
        payment_status: PaymentStatus::PaymentPending,
        subtotal: summary.subtotal,
        discount: summary.discount,
        coupon_code: summary.coupon_code().map(str::to_string),
        taxable_base: summary.taxable_base,
        tax_rate_bps: i64::from(summary.tax_rate.bps()),
        tax: summary.tax,
        total_weight_grams: summary.total_weight_grams,
        shipping_cost: summary.shipping_cost,
        grand_total: summary.grand_total,
        payment_token: None,
        payment_redirect_url: None,
        created_at: at,
        updated_at: at,
        paid_at: None,
        cancelled_at: None,
        cancel_reason: None,
        refunded_at: None,
    }
}

fn build_items(order_id: &str, summary: &OrderSummary) -> Vec<OrderItem> {
    summary
        .lines
        .iter()
        .map(|line| OrderItem {
            id: orders::generate_order_item_id(),
            order_id: order_id.to_string(),
            product_id: line.product_id.clone(),
            variant_id: line.variant_id.clone(),
            sku: line.sku.clone(),
            product_name: line.product_name.clone(),
            variant_name: line.variant_name.clone(),
            quantity: line.quantity,
            base_unit_price: line.base_unit_price,
            unit_price: line.unit_price,
            line_total: line.line_total,
            price_source: line.price_source,
            flash_sale_id: line.flash_sale_id.clone(),
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::gateway::ChargeToken;
    use crate::notify::DispatchError;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use orderline_core::shipping::{FlatRateShipping, ShippingQuote};
    use orderline_core::{Coupon, CouponStatus, DiscountKind, FlashSale, PriceSource, ProductVariant};
    use orderline_db::repository::catalog::new_product;
    use orderline_db::DbConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    // ===== Test doubles =====

    #[derive(Clone, Copy, PartialEq, Eq)]
    enum GatewayMode {
        Approve,
        Slow,
        Reject,
        Hang,
    }

    struct FakeGateway {
        mode: GatewayMode,
        calls: AtomicUsize,
    }

    impl FakeGateway {
        fn new(mode: GatewayMode) -> Self {
            Self {
                mode,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn create_charge_token(&self, request: &ChargeRequest) -> Result<ChargeToken, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.mode == GatewayMode::Slow {
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
            match self.mode {
                GatewayMode::Approve | GatewayMode::Slow => Ok(ChargeToken {
                    token: format!("tok-{}", request.order_number),
                    redirect_url: Some(format!("https://pay.example/{}", request.order_number)),
                }),
                GatewayMode::Reject => Err(GatewayError::Unavailable("503".into())),
                GatewayMode::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Err(GatewayError::Unavailable("unreachable".into()))
                }
            }
        }
    }

    struct FakeVerifier;

    impl SignatureVerifier for FakeVerifier {
        fn verify(&self, notification: &PaymentNotification) -> bool {
            notification.signature == "valid"
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        kinds: Mutex<Vec<NotificationKind>>,
        fail: bool,
        stall: bool,
    }

    impl RecordingNotifier {
        fn kinds(&self) -> Vec<NotificationKind> {
            self.kinds.lock().unwrap().clone()
        }

        /// Dispatch runs in the background; give it a moment to land.
        async fn settled(&self, count: usize) -> Vec<NotificationKind> {
            for _ in 0..100 {
                if self.kinds.lock().unwrap().len() >= count {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            self.kinds()
        }
    }

    #[async_trait]
    impl NotificationDispatcher for RecordingNotifier {
        async fn notify(&self, _order: &OrderWithItems, kind: NotificationKind) -> Result<(), DispatchError> {
            if self.stall {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            self.kinds.lock().unwrap().push(kind);
            if self.fail {
                return Err(DispatchError("smtp down".into()));
            }
            Ok(())
        }
    }

    // ===== Fixtures =====

    struct Harness {
        service: CheckoutService,
        db: Database,
        gateway: Arc<FakeGateway>,
        notifier: Arc<RecordingNotifier>,
    }

    async fn harness_with(mode: GatewayMode, notifier: RecordingNotifier) -> Harness {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let shipping = Arc::new(FlatRateShipping::new(Money::from_minor(10_000), 2));
        harness_on(db, mode, notifier, shipping)
    }

    fn harness_on(
        db: Database,
        mode: GatewayMode,
        notifier: RecordingNotifier,
        shipping: Arc<dyn ShippingRateProvider>,
    ) -> Harness {
        let mut config = CheckoutConfig::new();
        config.collaborators.timeout_secs = 1;

        let gateway = Arc::new(FakeGateway::new(mode));
        let notifier = Arc::new(notifier);
        let service = CheckoutService::new(
            db.clone(),
            &config,
            Collaborators {
                shipping,
                gateway: gateway.clone(),
                verifier: Arc::new(FakeVerifier),
                notifier: notifier.clone(),
            },
        );

        Harness {
            service,
            db,
            gateway,
            notifier,
        }
    }

    async fn harness() -> Harness {
        harness_with(GatewayMode::Approve, RecordingNotifier::default()).await
    }

    async fn seed_product(db: &Database, id: &str, price: i64, stock: i64) {
        let mut product = new_product(format!("SKU-{}", id), format!("Product {}", id), Money::from_minor(price), 500, stock);
        product.id = id.to_string();
        db.catalog().insert_product(&product).await.unwrap();
    }

    async fn seed_coupon(db: &Database, code: &str, max_usage: Option<i64>) {
        let now = Utc::now();
        let coupon = Coupon {
            id: format!("C-{}", code),
            code: code.to_string(),
            name: format!("Coupon {}", code),
            kind: DiscountKind::Percentage,
            value: 10,
            max_discount: None,
            min_purchase: Money::zero(),
            max_usage_count: max_usage,
            max_usage_per_user: None,
            valid_from: now - ChronoDuration::days(1),
            valid_until: now + ChronoDuration::days(1),
            status: CouponStatus::Active,
            for_retail: true,
            for_reseller: true,
            free_shipping: false,
            usage_count: 0,
        };
        db.coupons().insert(&coupon).await.unwrap();
    }

    fn customer() -> CustomerInfo {
        CustomerInfo {
            name: "Siti Rahma".to_string(),
            phone: "081234567890".to_string(),
            email: Some("siti@example.com".to_string()),
            address: "Jl. Merdeka No. 10, Bandung".to_string(),
        }
    }

    fn cart(product_id: &str, quantity: i64) -> CheckoutRequest {
        CheckoutRequest::new(vec![ItemRequest::new(product_id, quantity)], customer(), "BDG")
    }

    fn paid(order_number: &str) -> PaymentNotification {
        PaymentNotification::new(order_number, "settlement", "valid")
    }

    async fn stock_of(db: &Database, product_id: &str) -> i64 {
        db.stock().stock_of(product_id, None).await.unwrap()
    }

    // ===== Checkout =====

    #[tokio::test]
    async fn test_checkout_retail_scenario() {
        let h = harness().await;
        seed_product(&h.db, "A", 50_000, 5).await;

        let receipt = h.service.checkout(&cart("A", 2), Utc::now()).await.unwrap();

        let summary = &receipt.summary;
        assert_eq!(summary.subtotal.minor(), 100_000);
        assert_eq!(summary.discount.minor(), 0);
        assert_eq!(summary.tax.minor(), 11_000);
        assert_eq!(summary.shipping_cost.minor(), 10_000);
        assert_eq!(summary.grand_total.minor(), 121_000);

        let order = &receipt.order.order;
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::PaymentPending);
        assert_eq!(order.grand_total.minor(), 121_000);
        assert_eq!(order.tax_rate_bps, 1100);
        assert_eq!(order.shipping_origin, "JKT");
        assert!(order.order_number.starts_with("ORD-"));
        assert_eq!(receipt.payment_token, format!("tok-{}", order.order_number));

        assert_eq!(stock_of(&h.db, "A").await, 3);

        let stored = h.service.get_order(&order.order_number).await.unwrap();
        assert_eq!(stored.items.len(), 1);
        assert_eq!(stored.items[0].quantity, 2);
        assert_eq!(stored.items[0].price_source, PriceSource::Base);
        assert_eq!(stored.order.payment_token.as_deref(), Some(receipt.payment_token.as_str()));

        let ledger = h.service.stock_history(&order.order_number).await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].delta, -2);
        assert_eq!(ledger[0].reason, StockReason::Checkout);

        assert_eq!(h.notifier.settled(1).await, vec![NotificationKind::OrderCreated]);
    }

    #[tokio::test]
    async fn test_checkout_with_coupon_scenario() {
        let h = harness().await;
        seed_product(&h.db, "A", 50_000, 5).await;
        seed_coupon(&h.db, "SALE10", None).await;

        let receipt = h
            .service
            .checkout(&cart("A", 2).with_coupon("sale10"), Utc::now())
            .await
            .unwrap();

        assert_eq!(receipt.summary.discount.minor(), 10_000);
        assert_eq!(receipt.summary.taxable_base.minor(), 90_000);
        assert_eq!(receipt.summary.tax.minor(), 9_900);
        assert_eq!(receipt.summary.grand_total.minor(), 109_900);
        assert_eq!(receipt.order.order.coupon_code.as_deref(), Some("SALE10"));

        let usages = h.db.coupons().usages_for_order(&receipt.order.order.order_number).await.unwrap();
        assert_eq!(usages.len(), 1);
        let coupon = h.db.coupons().get_by_code("SALE10").await.unwrap().unwrap();
        assert_eq!(coupon.usage_count, 1);
    }

    #[tokio::test]
    async fn test_checkout_matches_prior_quote() {
        let h = harness().await;
        seed_product(&h.db, "A", 50_000, 5).await;
        seed_coupon(&h.db, "SALE10", None).await;

        let at = Utc::now();
        let request = cart("A", 2).with_coupon("SALE10");
        let quote = h.service.quote(&request.quote_request(h.service.origin()), at).await.unwrap();
        let receipt = h.service.checkout(&request.expecting(quote.grand_total), at).await.unwrap();

        assert_eq!(receipt.summary, quote);
    }

    #[tokio::test]
    async fn test_quote_mismatch_writes_nothing() {
        let h = harness().await;
        seed_product(&h.db, "A", 50_000, 5).await;

        let err = h
            .service
            .checkout(&cart("A", 2).expecting(Money::from_minor(120_000)), Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::QuoteMismatch { .. }));
        assert_eq!(stock_of(&h.db, "A").await, 5);
        assert_eq!(h.gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_insufficient_stock() {
        let h = harness().await;
        seed_product(&h.db, "A", 50_000, 1).await;

        let err = h.service.checkout(&cart("A", 2), Utc::now()).await.unwrap_err();
        match err {
            CheckoutError::InsufficientStock { requested, available, .. } => {
                assert_eq!(requested, 2);
                assert_eq!(available, 1);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(stock_of(&h.db, "A").await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checkout_of_last_unit() {
        let path = std::env::temp_dir().join(format!("orderline-checkout-{}.db", uuid::Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path).max_connections(5)).await.unwrap();
        let shipping = Arc::new(FlatRateShipping::new(Money::from_minor(10_000), 2));
        let h = harness_on(db, GatewayMode::Slow, RecordingNotifier::default(), shipping);
        seed_product(&h.db, "A", 50_000, 1).await;

        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let service = h.service.clone();
                tokio::spawn(async move { service.checkout(&cart("A", 1), Utc::now()).await })
            })
            .collect();
        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap());
        }

        let placed = results.iter().filter(|r| r.is_ok()).count();
        let short = results
            .iter()
            .filter(|r| matches!(r, Err(CheckoutError::InsufficientStock { .. })))
            .count();
        assert_eq!((placed, short), (1, 1), "results: {:?}", results);
        assert_eq!(stock_of(&h.db, "A").await, 0);

        h.db.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }

    #[tokio::test]
    async fn test_coupon_usage_exceeded_rolls_back() {
        let h = harness().await;
        seed_product(&h.db, "A", 50_000, 5).await;
        seed_coupon(&h.db, "ONCE", Some(1)).await;

        h.service.checkout(&cart("A", 1).with_coupon("ONCE"), Utc::now()).await.unwrap();
        let err = h
            .service
            .checkout(&cart("A", 1).with_coupon("ONCE"), Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::Pricing(PricingError::CouponUsageExceeded(_))));
        assert_eq!(err.kind(), orderline_core::ErrorKind::Conflict);
        assert_eq!(stock_of(&h.db, "A").await, 4);
    }

    #[tokio::test]
    async fn test_gateway_failure_rolls_back() {
        let h = harness_with(GatewayMode::Reject, RecordingNotifier::default()).await;
        seed_product(&h.db, "A", 50_000, 5).await;
        seed_coupon(&h.db, "SALE10", Some(10)).await;

        let err = h
            .service
            .checkout(&cart("A", 2).with_coupon("SALE10"), Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::Gateway(_)));
        assert!(err.is_retryable());
        assert_eq!(stock_of(&h.db, "A").await, 5);
        let coupon = h.db.coupons().get_by_code("SALE10").await.unwrap().unwrap();
        assert_eq!(coupon.usage_count, 0);
        assert!(h.db.stock().history_for_product("A").await.unwrap().is_empty());
        assert!(h.notifier.kinds().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_timeout_rolls_back() {
        let h = harness_with(GatewayMode::Hang, RecordingNotifier::default()).await;
        seed_product(&h.db, "A", 50_000, 5).await;

        let err = h.service.checkout(&cart("A", 1), Utc::now()).await.unwrap_err();

        assert!(matches!(err, CheckoutError::CollaboratorTimeout { secs: 1, .. }));
        assert!(err.is_retryable());
        assert_eq!(stock_of(&h.db, "A").await, 5);
    }

    struct StuckShipping;

    impl ShippingRateProvider for StuckShipping {
        fn quote(&self, _: &str, _: &str, _: i64) -> Result<ShippingQuote, ShippingError> {
            std::thread::sleep(Duration::from_secs(2));
            Ok(ShippingQuote {
                cost: Money::from_minor(10_000),
                estimated_days: 2,
            })
        }
    }

    #[tokio::test]
    async fn test_stuck_shipping_provider_times_out() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let h = harness_on(db, GatewayMode::Approve, RecordingNotifier::default(), Arc::new(StuckShipping));
        seed_product(&h.db, "A", 50_000, 5).await;

        let err = h.service.checkout(&cart("A", 1), Utc::now()).await.unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::Pricing(PricingError::Shipping(ShippingError::Timeout(1)))
        ));
        assert!(err.is_retryable());
        assert_eq!(h.gateway.calls.load(Ordering::SeqCst), 0);
        assert_eq!(stock_of(&h.db, "A").await, 5);

        let quote = h.service.quote(&cart("A", 1).quote_request("JKT"), Utc::now()).await;
        assert!(matches!(
            quote,
            Err(CheckoutError::Pricing(PricingError::Shipping(ShippingError::Timeout(1))))
        ));
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_checkout() {
        let notifier = RecordingNotifier {
            fail: true,
            ..Default::default()
        };
        let h = harness_with(GatewayMode::Approve, notifier).await;
        seed_product(&h.db, "A", 50_000, 5).await;

        let receipt = h.service.checkout(&cart("A", 1), Utc::now()).await.unwrap();
        assert!(h.service.get_order(&receipt.order.order.order_number).await.is_ok());
        assert_eq!(h.notifier.settled(1).await, vec![NotificationKind::OrderCreated]);
    }

    #[tokio::test]
    async fn test_stalled_notifier_does_not_delay_checkout() {
        let notifier = RecordingNotifier {
            stall: true,
            ..Default::default()
        };
        let h = harness_with(GatewayMode::Approve, notifier).await;
        seed_product(&h.db, "A", 50_000, 5).await;

        let started = std::time::Instant::now();
        let receipt = h.service.checkout(&cart("A", 1), Utc::now()).await.unwrap();
        h.service.cancel(&receipt.order.order.order_number, Some("changed mind")).await.unwrap();

        // Two awaited dispatches would take the 1s timeout each.
        assert!(started.elapsed() < Duration::from_millis(900));
        assert!(h.notifier.kinds().is_empty());
    }

    #[tokio::test]
    async fn test_flash_sale_claim_and_cap() {
        let h = harness().await;
        seed_product(&h.db, "A", 50_000, 10).await;
        let now = Utc::now();
        h.db.catalog()
            .insert_flash_sale(&FlashSale {
                id: "FS-1".to_string(),
                product_id: "A".to_string(),
                sale_price: Money::from_minor(40_000),
                starts_at: now - ChronoDuration::hours(1),
                ends_at: now + ChronoDuration::hours(1),
                per_user_limit: None,
                stock_cap: Some(2),
                sold_count: 0,
            })
            .await
            .unwrap();

        let receipt = h.service.checkout(&cart("A", 2).with_user("u1"), now).await.unwrap();
        assert_eq!(receipt.order.items[0].unit_price.minor(), 40_000);
        assert_eq!(receipt.order.items[0].flash_sale_id.as_deref(), Some("FS-1"));

        let sale = h.db.catalog().get_flash_sale("FS-1").await.unwrap().unwrap();
        assert_eq!(sale.sold_count, 2);

        // Cancelling releases the claimed units
        h.service.cancel(&receipt.order.order.order_number, None).await.unwrap();
        let sale = h.db.catalog().get_flash_sale("FS-1").await.unwrap().unwrap();
        assert_eq!(sale.sold_count, 0);
    }

    #[tokio::test]
    async fn test_flash_sale_user_cap_spans_variant_lines() {
        let h = harness().await;
        seed_product(&h.db, "A", 50_000, 10).await;
        for variant in ["A-S", "A-M"] {
            h.db.catalog()
                .insert_variant(&ProductVariant {
                    id: variant.to_string(),
                    product_id: "A".to_string(),
                    name: variant.to_string(),
                    price_override: None,
                    weight_override_grams: None,
                    stock: 5,
                    is_active: true,
                })
                .await
                .unwrap();
        }
        let now = Utc::now();
        h.db.catalog()
            .insert_flash_sale(&FlashSale {
                id: "FS-1".to_string(),
                product_id: "A".to_string(),
                sale_price: Money::from_minor(40_000),
                starts_at: now - ChronoDuration::hours(1),
                ends_at: now + ChronoDuration::hours(1),
                per_user_limit: Some(2),
                stock_cap: None,
                sold_count: 0,
            })
            .await
            .unwrap();

        let request = CheckoutRequest::new(
            vec![
                ItemRequest::new("A", 2).with_variant("A-S"),
                ItemRequest::new("A", 2).with_variant("A-M"),
            ],
            customer(),
            "BDG",
        )
        .with_user("u1");

        let quote = h.service.quote(&request.quote_request(h.service.origin()), now).await.unwrap();
        let prices: Vec<_> = quote.lines.iter().map(|line| line.unit_price.minor()).collect();
        assert_eq!(prices, vec![40_000, 50_000]);

        let receipt = h
            .service
            .checkout(&request.clone().expecting(quote.grand_total), now)
            .await
            .unwrap();
        assert_eq!(receipt.summary.grand_total, quote.grand_total);
        assert_eq!(receipt.order.items[1].price_source, PriceSource::Base);

        let sale = h.db.catalog().get_flash_sale("FS-1").await.unwrap().unwrap();
        assert_eq!(sale.sold_count, 2);
    }

    #[tokio::test]
    async fn test_invalid_customer_rejected_before_writes() {
        let h = harness().await;
        seed_product(&h.db, "A", 50_000, 5).await;

        let mut request = cart("A", 1);
        request.customer.phone = String::new();
        let err = h.service.checkout(&request, Utc::now()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)));

        let err = h
            .service
            .checkout(&CheckoutRequest::new(vec![ItemRequest::new("A", 1)], customer(), " "), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(ValidationError::Required { .. })));
        assert_eq!(stock_of(&h.db, "A").await, 5);
    }

    // ===== Payment notifications =====

    #[tokio::test]
    async fn test_paid_notification_confirms_order() {
        let h = harness().await;
        seed_product(&h.db, "A", 50_000, 5).await;
        let receipt = h.service.checkout(&cart("A", 2), Utc::now()).await.unwrap();
        let number = receipt.order.order.order_number.clone();

        let outcome = h
            .service
            .process_payment_notification(&paid(&number).with_gross_amount(Money::from_minor(121_000)))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            NotificationOutcome::Applied {
                payment_status: PaymentStatus::Paid,
                order_status: OrderStatus::Confirmed,
            }
        );

        let order = h.service.get_order(&number).await.unwrap().order;
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert!(order.paid_at.is_some());
        assert_eq!(
            h.notifier.settled(2).await,
            vec![NotificationKind::OrderCreated, NotificationKind::PaymentReceived]
        );
    }

    #[tokio::test]
    async fn test_duplicate_paid_notification_is_noop() {
        let h = harness().await;
        seed_product(&h.db, "A", 50_000, 5).await;
        let receipt = h.service.checkout(&cart("A", 2), Utc::now()).await.unwrap();
        let number = receipt.order.order.order_number.clone();

        h.service.process_payment_notification(&paid(&number)).await.unwrap();
        let before = h.service.get_order(&number).await.unwrap();

        let outcome = h.service.process_payment_notification(&paid(&number)).await.unwrap();
        assert_eq!(outcome, NotificationOutcome::Duplicate);

        let after = h.service.get_order(&number).await.unwrap();
        assert_eq!(after.order.status, before.order.status);
        assert_eq!(after.order.payment_status, before.order.payment_status);
        assert_eq!(after.order.paid_at, before.order.paid_at);
        assert_eq!(stock_of(&h.db, "A").await, 3);
        assert_eq!(h.service.stock_history(&number).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_notification_restores_stock() {
        let h = harness().await;
        seed_product(&h.db, "A", 50_000, 5).await;
        let receipt = h.service.checkout(&cart("A", 2), Utc::now()).await.unwrap();
        let number = receipt.order.order.order_number.clone();

        let outcome = h
            .service
            .process_payment_notification(&PaymentNotification::new(&number, "expire", "valid"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            NotificationOutcome::Applied {
                payment_status: PaymentStatus::Failed,
                order_status: OrderStatus::Cancelled,
            }
        );
        assert_eq!(stock_of(&h.db, "A").await, 5);

        let ledger = h.service.stock_history(&number).await.unwrap();
        assert_eq!(ledger.len(), 2);
        assert!(ledger
            .iter()
            .any(|log| log.reason == StockReason::PaymentFailedRestore && log.delta == 2));

        // A late success contradicts the recorded failure
        let err = h.service.process_payment_notification(&paid(&number)).await.unwrap_err();
        assert!(matches!(err, CheckoutError::ConflictingEvent { .. }));
        assert_eq!(stock_of(&h.db, "A").await, 5);
    }

    #[tokio::test]
    async fn test_stale_notification_rejected() {
        let h = harness().await;
        seed_product(&h.db, "A", 50_000, 5).await;
        let receipt = h.service.checkout(&cart("A", 1), Utc::now()).await.unwrap();
        let number = receipt.order.order.order_number.clone();

        h.service.process_payment_notification(&paid(&number)).await.unwrap();
        let err = h
            .service
            .process_payment_notification(&PaymentNotification::new(&number, "deny", "valid"))
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::StaleEvent { .. }));
        let order = h.service.get_order(&number).await.unwrap().order;
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(stock_of(&h.db, "A").await, 4);
    }

    #[tokio::test]
    async fn test_rejected_notifications_change_nothing() {
        let h = harness().await;
        seed_product(&h.db, "A", 50_000, 5).await;
        let receipt = h.service.checkout(&cart("A", 1), Utc::now()).await.unwrap();
        let number = receipt.order.order.order_number.clone();

        let err = h
            .service
            .process_payment_notification(&PaymentNotification::new(&number, "settlement", "forged"))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidSignature { .. }));

        let err = h
            .service
            .process_payment_notification(&paid("ORD-19700101-00000000"))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::OrderNotFound(_)));
        assert_eq!(err.kind(), orderline_core::ErrorKind::Inconsistency);

        let err = h
            .service
            .process_payment_notification(&paid(&number).with_gross_amount(Money::from_minor(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::AmountMismatch { .. }));

        let err = h
            .service
            .process_payment_notification(&PaymentNotification::new(&number, "authorize", "valid"))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::UnknownPaymentStatus(_)));

        let order = h.service.get_order(&number).await.unwrap().order;
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::PaymentPending);
    }

    // ===== Cancel, refund, fulfillment =====

    #[tokio::test]
    async fn test_cancel_restores_exact_quantities() {
        let h = harness().await;
        seed_product(&h.db, "A", 50_000, 5).await;
        seed_product(&h.db, "B", 20_000, 4).await;

        let request = CheckoutRequest::new(
            vec![ItemRequest::new("A", 2), ItemRequest::new("B", 3)],
            customer(),
            "BDG",
        );
        let receipt = h.service.checkout(&request, Utc::now()).await.unwrap();
        let number = receipt.order.order.order_number.clone();
        assert_eq!(stock_of(&h.db, "A").await, 3);
        assert_eq!(stock_of(&h.db, "B").await, 1);

        let cancelled = h.service.cancel(&number, Some("changed my mind")).await.unwrap();
        assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.order.payment_status, PaymentStatus::PaymentPending);
        assert_eq!(cancelled.order.cancel_reason.as_deref(), Some("changed my mind"));
        assert!(cancelled.order.cancelled_at.is_some());

        assert_eq!(stock_of(&h.db, "A").await, 5);
        assert_eq!(stock_of(&h.db, "B").await, 4);

        let ledger = h.service.stock_history(&number).await.unwrap();
        let net: i64 = ledger.iter().map(|log| log.delta).sum();
        assert_eq!(ledger.len(), 4);
        assert_eq!(net, 0);

        // Second cancel is refused and restores nothing
        let err = h.service.cancel(&number, None).await.unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidTransition(_)));
        assert_eq!(stock_of(&h.db, "A").await, 5);
    }

    #[tokio::test]
    async fn test_refund_after_cancel_does_not_restore_twice() {
        let h = harness().await;
        seed_product(&h.db, "A", 50_000, 5).await;
        let receipt = h.service.checkout(&cart("A", 2), Utc::now()).await.unwrap();
        let number = receipt.order.order.order_number.clone();

        h.service.process_payment_notification(&paid(&number)).await.unwrap();
        h.service.cancel(&number, Some("out of area")).await.unwrap();
        assert_eq!(stock_of(&h.db, "A").await, 5);

        let refunded = h.service.refund(&number).await.unwrap();
        assert_eq!(refunded.order.status, OrderStatus::Refunded);
        assert_eq!(refunded.order.payment_status, PaymentStatus::Refunded);
        assert!(refunded.order.refunded_at.is_some());
        assert_eq!(stock_of(&h.db, "A").await, 5);
        assert_eq!(h.service.stock_history(&number).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_refund_paid_order_restores_stock() {
        let h = harness().await;
        seed_product(&h.db, "A", 50_000, 5).await;
        let receipt = h.service.checkout(&cart("A", 2), Utc::now()).await.unwrap();
        let number = receipt.order.order.order_number.clone();

        let err = h.service.refund(&number).await.unwrap_err();
        assert!(matches!(err, CheckoutError::NotRefundable { .. }));

        h.service.process_payment_notification(&paid(&number)).await.unwrap();
        h.service.refund(&number).await.unwrap();

        assert_eq!(stock_of(&h.db, "A").await, 5);
        let ledger = h.service.stock_history(&number).await.unwrap();
        assert!(ledger.iter().any(|log| log.reason == StockReason::Refunded));
    }

    #[tokio::test]
    async fn test_advance_fulfillment() {
        let h = harness().await;
        seed_product(&h.db, "A", 50_000, 5).await;
        let receipt = h.service.checkout(&cart("A", 1), Utc::now()).await.unwrap();
        let number = receipt.order.order.order_number.clone();

        // Unpaid orders cannot be processed
        let err = h
            .service
            .advance_fulfillment(&number, OrderStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidTransition(_)));

        h.service.process_payment_notification(&paid(&number)).await.unwrap();

        let err = h.service.advance_fulfillment(&number, OrderStatus::Shipped).await.unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidTransition(_)));

        for to in [OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered] {
            let order = h.service.advance_fulfillment(&number, to).await.unwrap();
            assert_eq!(order.order.status, to);
        }

        let err = h.service.cancel(&number, None).await.unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_unknown_order_queries() {
        let h = harness().await;
        let err = h.service.get_order("ORD-19700101-00000000").await.unwrap_err();
        assert!(matches!(err, CheckoutError::OrderNotFound(_)));
        let err = h.service.cancel("ORD-19700101-00000000", None).await.unwrap_err();
        assert!(matches!(err, CheckoutError::OrderNotFound(_)));
    }
}
