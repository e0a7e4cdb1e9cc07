use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Dairy Billing API",
        version = "0.1.0",
        description = "Счета, платежи и доставки для молочной подписки",
        contact(
            name = "LocalHood Team",
            email = "support@localhood.kz"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server")
    ),
    tags(
        (name = "billing", description = "Месячные счета и задолженность клиентов"),
        (name = "payments", description = "Наличные и онлайн-платежи"),
        (name = "deliveries", description = "Доставки и их статусы"),
        (name = "scheduler", description = "Фоновые задачи")
    ),
    paths(
        // Billing
        crate::api::billing::generate_bill,
        crate::api::billing::generate_all_bills,
        crate::api::billing::list_bills,
        crate::api::billing::get_bill,
        crate::api::billing::record_bill_payment,
        crate::api::billing::send_bill,
        crate::api::billing::customer_balance,
        // Payments
        crate::api::payments::create_order,
        crate::api::payments::verify_payment,
        crate::api::payments::record_cash_payment,
        crate::api::payments::list_payments,
        // Deliveries
        crate::api::deliveries::create_delivery,
        crate::api::deliveries::list_deliveries,
        crate::api::deliveries::confirm_delivery,
        crate::api::deliveries::mark_delivered,
        crate::api::deliveries::skip_delivery,
        crate::api::deliveries::cancel_delivery,
        // Scheduler
        crate::api::scheduler::run_job,
        crate::api::scheduler::list_runs,
    ),
    components(
        schemas(
            // Billing
            crate::models::Bill,
            crate::models::BillStatus,
            crate::models::BillItemResponse,
            crate::models::BillPaymentEntry,
            crate::models::BillReminder,
            crate::models::ReminderKind,
            crate::models::BillResponse,
            crate::models::GenerateBillRequest,
            crate::models::GenerateAllBillsRequest,
            crate::models::GenerateAllBillsResponse,
            crate::models::BatchError,
            crate::models::RecordBillPaymentRequest,
            crate::models::CustomerBalanceResponse,
            crate::models::ProductUnit,
            // Payments
            crate::models::Payment,
            crate::models::PaymentMethod,
            crate::models::PaymentStatus,
            crate::models::CashPaymentRequest,
            crate::models::CreateOrderRequest,
            crate::models::CreateOrderResponse,
            crate::models::GatewayOrder,
            crate::models::VerifyPaymentRequest,
            // Deliveries
            crate::models::Delivery,
            crate::models::DeliveryItem,
            crate::models::DeliveryStatus,
            crate::models::DeliveryPaymentStatus,
            crate::models::TimeSlot,
            crate::models::SkipInitiator,
            crate::models::CreateDeliveryRequest,
            crate::models::CreateDeliveryItemRequest,
            crate::models::DeliverRequest,
            crate::models::SkipDeliveryRequest,
            // Scheduler
            crate::models::JobRun,
            crate::models::JobRunStatus,
            crate::models::JobReport,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            );
        }
    }
}
