//! Сведение доставок клиента за период в строки счёта.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Delivery, DeliveryStatus, ProductUnit};
use crate::storage::BillingStore;
use crate::utils::ledger;

/// Итог по одному продукту за период.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductTotals {
    pub product_id: Uuid,
    pub product_name: String,
    pub unit: ProductUnit,
    /// Цена последней доставки периода.
    pub price_per_unit: Decimal,
    pub total_quantity: Decimal,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliverySummary {
    pub lines: Vec<ProductTotals>,
    pub total_litres: Decimal,
    pub delivered_count: usize,
    pub skipped_count: usize,
    pub delivery_ids: Vec<Uuid>,
    pub subtotal: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Aggregation {
    NoBillableDeliveries { skipped_count: usize },
    Billable(DeliverySummary),
}

pub fn aggregate_deliveries(deliveries: &[Delivery]) -> Aggregation {
    let mut lines: Vec<ProductTotals> = Vec::new();
    let mut delivery_ids: Vec<Uuid> = Vec::new();
    let mut delivered_count = 0;
    let mut skipped_count = 0;

    for delivery in deliveries {
        match delivery.status {
            DeliveryStatus::Delivered => delivered_count += 1,
            DeliveryStatus::Skipped => {
                skipped_count += 1;
                continue;
            }
            _ => continue,
        }

        if !delivery_ids.contains(&delivery.id) {
            delivery_ids.push(delivery.id);
        }

        for item in &delivery.items {
            let amount = ledger::line_total(item.quantity, item.unit_price);
            match lines.iter_mut().find(|l| l.product_id == item.product_id) {
                Some(line) => {
                    line.total_quantity += item.quantity;
                    line.total_amount += amount;
                    line.price_per_unit = item.unit_price;
                }
                None => lines.push(ProductTotals {
                    product_id: item.product_id,
                    product_name: item.product_name.clone(),
                    unit: item.unit,
                    price_per_unit: item.unit_price,
                    total_quantity: item.quantity,
                    total_amount: amount,
                }),
            }
        }
    }

    if delivered_count == 0 {
        return Aggregation::NoBillableDeliveries { skipped_count };
    }

    let total_litres = lines
        .iter()
        .filter(|l| l.unit.is_litre())
        .map(|l| l.total_quantity)
        .sum();
    let subtotal = ledger::round_money(lines.iter().map(|l| l.total_amount).sum());

    Aggregation::Billable(DeliverySummary {
        lines,
        total_litres,
        delivered_count,
        skipped_count,
        delivery_ids,
        subtotal,
    })
}

pub async fn aggregate_for_period(
    store: &dyn BillingStore,
    customer_id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
) -> AppResult<Aggregation> {
    let deliveries = store.deliveries_in_range(customer_id, start, end).await?;
    tracing::debug!(
        customer_id = %customer_id,
        count = deliveries.len(),
        "Aggregating deliveries {} - {}",
        start,
        end
    );
    Ok(aggregate_deliveries(&deliveries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeliveryItem, DeliveryPaymentStatus, TimeSlot};
    use chrono::Utc;

    fn item(product_id: Uuid, unit: ProductUnit, quantity: i64, price: i64) -> DeliveryItem {
        DeliveryItem {
            id: Uuid::new_v4(),
            delivery_id: Uuid::nil(),
            position: 0,
            product_id,
            product_name: "Milk".to_string(),
            unit,
            quantity: Decimal::from(quantity),
            unit_price: Decimal::from(price),
            total: Decimal::from(quantity * price),
        }
    }

    fn delivery(status: DeliveryStatus, items: Vec<DeliveryItem>) -> Delivery {
        let now = Utc::now();
        Delivery {
            id: Uuid::new_v4(),
            customer_id: Uuid::nil(),
            deliverer_id: None,
            route_id: None,
            delivery_date: now.date_naive(),
            time_slot: TimeSlot::Morning,
            amount: items.iter().map(|i| i.total).sum(),
            status,
            skip_reason: None,
            skipped_by: None,
            payment_status: DeliveryPaymentStatus::Unpaid,
            payment_method: None,
            delivered_at: None,
            created_at: now,
            updated_at: now,
            items,
        }
    }

    #[test]
    fn test_same_product_is_summed_into_one_line() {
        let milk = Uuid::new_v4();
        let deliveries = vec![
            delivery(DeliveryStatus::Delivered, vec![item(milk, ProductUnit::Litre, 2, 60)]),
            delivery(DeliveryStatus::Delivered, vec![item(milk, ProductUnit::Litre, 3, 60)]),
        ];

        let Aggregation::Billable(summary) = aggregate_deliveries(&deliveries) else {
            panic!("expected billable aggregation");
        };
        assert_eq!(summary.lines.len(), 1);
        assert_eq!(summary.lines[0].total_quantity, Decimal::from(5));
        assert_eq!(summary.lines[0].total_amount, Decimal::from(300));
        assert_eq!(summary.subtotal, Decimal::from(300));
        assert_eq!(summary.total_litres, Decimal::from(5));
        assert_eq!(summary.delivered_count, 2);
    }

    #[test]
    fn test_only_delivered_contribute() {
        let milk = Uuid::new_v4();
        let curd = Uuid::new_v4();
        let deliveries = vec![
            delivery(DeliveryStatus::Delivered, vec![item(milk, ProductUnit::Litre, 1, 60)]),
            delivery(DeliveryStatus::Skipped, vec![]),
            delivery(DeliveryStatus::Scheduled, vec![item(milk, ProductUnit::Litre, 9, 60)]),
            delivery(DeliveryStatus::Cancelled, vec![item(milk, ProductUnit::Litre, 9, 60)]),
            delivery(DeliveryStatus::Delivered, vec![item(curd, ProductUnit::Kilogram, 2, 80)]),
        ];

        let Aggregation::Billable(summary) = aggregate_deliveries(&deliveries) else {
            panic!("expected billable aggregation");
        };
        assert_eq!(summary.delivered_count, 2);
        assert_eq!(summary.skipped_count, 1);
        assert_eq!(summary.delivery_ids.len(), 2);
        assert_eq!(summary.lines[0].product_id, milk);
        assert_eq!(summary.lines[1].product_id, curd);
        assert_eq!(summary.total_litres, Decimal::from(1));
        assert_eq!(summary.subtotal, Decimal::from(220));
    }

    #[test]
    fn test_last_observed_price_wins() {
        let milk = Uuid::new_v4();
        let deliveries = vec![
            delivery(DeliveryStatus::Delivered, vec![item(milk, ProductUnit::Litre, 1, 60)]),
            delivery(DeliveryStatus::Delivered, vec![item(milk, ProductUnit::Litre, 1, 64)]),
        ];

        let Aggregation::Billable(summary) = aggregate_deliveries(&deliveries) else {
            panic!("expected billable aggregation");
        };
        assert_eq!(summary.lines[0].price_per_unit, Decimal::from(64));
        assert_eq!(summary.lines[0].total_amount, Decimal::from(124));
    }

    #[test]
    fn test_no_delivered_is_not_billable() {
        assert_eq!(
            aggregate_deliveries(&[]),
            Aggregation::NoBillableDeliveries { skipped_count: 0 }
        );
        let skipped = vec![delivery(DeliveryStatus::Skipped, vec![])];
        assert_eq!(
            aggregate_deliveries(&skipped),
            Aggregation::NoBillableDeliveries { skipped_count: 1 }
        );
    }
}
