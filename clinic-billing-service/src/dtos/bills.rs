use crate::billing::{ArchiveBill, CreateBill, RecordPayment, UpdateBill};
use crate::models::{Actor, PaymentMethod, QuantityUpdateInput, ServiceLineInput};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceLineRequest {
    pub service_id: Uuid,
    pub quantity: Decimal,
}

impl From<ServiceLineRequest> for ServiceLineInput {
    fn from(req: ServiceLineRequest) -> Self {
        ServiceLineInput {
            service_id: req.service_id,
            quantity: req.quantity,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantityUpdateRequest {
    pub billed_service_id: Uuid,
    pub new_quantity: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBillRequest {
    pub documentation_id: Uuid,
    /// Empty for a consultation-only bill.
    #[serde(default)]
    pub services: Vec<ServiceLineRequest>,
    #[validate(length(max = 2000, message = "Notes must be at most 2000 characters"))]
    pub notes: Option<String>,
    pub initial_payment_amount: Option<Decimal>,
    /// 250 (default) or 350 (follow-up).
    pub consultation_fee_tier: Option<Decimal>,
    pub payment_method: Option<PaymentMethod>,
    pub is_senior_pwd_discount_applied: Option<bool>,
    pub discount_rate: Option<Decimal>,
    #[serde(default)]
    pub cleanup_documentation_on_failure: bool,
    #[validate(length(min = 1, message = "Actor name is required"))]
    pub actor_name: String,
    #[validate(length(min = 1, message = "Actor role is required"))]
    pub actor_role: String,
}

impl From<CreateBillRequest> for CreateBill {
    fn from(req: CreateBillRequest) -> Self {
        CreateBill {
            documentation_id: req.documentation_id,
            services: req.services.into_iter().map(Into::into).collect(),
            notes: req.notes,
            initial_payment_amount: req.initial_payment_amount,
            payment_method: req.payment_method,
            consultation_fee: req.consultation_fee_tier,
            is_senior_pwd_discount_applied: req.is_senior_pwd_discount_applied,
            discount_rate: req.discount_rate,
            cleanup_documentation_on_failure: req.cleanup_documentation_on_failure,
            actor: Actor::new(req.actor_name, req.actor_role),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBillRequest {
    #[serde(default)]
    pub services_to_add: Vec<ServiceLineRequest>,
    #[serde(default)]
    pub services_to_remove: Vec<Uuid>,
    #[serde(default)]
    pub services_to_update: Vec<QuantityUpdateRequest>,
    pub is_senior_pwd_discount_applied: Option<bool>,
    pub discount_rate: Option<Decimal>,
    #[validate(length(max = 2000, message = "Notes must be at most 2000 characters"))]
    pub notes: Option<String>,
    /// New cumulative amount paid to date.
    pub amount_paid: Option<Decimal>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_notes: Option<String>,
    #[validate(length(min = 1, message = "Actor name is required"))]
    pub actor_name: String,
    #[validate(length(min = 1, message = "Actor role is required"))]
    pub actor_role: String,
}

impl UpdateBillRequest {
    pub fn into_input(self, bill_id: Uuid) -> UpdateBill {
        UpdateBill {
            bill_id,
            services_to_add: self.services_to_add.into_iter().map(Into::into).collect(),
            services_to_remove: self.services_to_remove,
            services_to_update: self
                .services_to_update
                .into_iter()
                .map(|u| QuantityUpdateInput {
                    billed_service_id: u.billed_service_id,
                    new_quantity: u.new_quantity,
                })
                .collect(),
            is_senior_pwd_discount_applied: self.is_senior_pwd_discount_applied,
            discount_rate: self.discount_rate,
            notes: self.notes,
            amount_paid: self.amount_paid,
            payment_method: self.payment_method,
            payment_notes: self.payment_notes,
            actor: Actor::new(self.actor_name, self.actor_role),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RecordPaymentRequest {
    pub payment_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "Actor name is required"))]
    pub actor_name: String,
    #[validate(length(min = 1, message = "Actor role is required"))]
    pub actor_role: String,
}

impl RecordPaymentRequest {
    pub fn into_input(self, bill_id: Uuid) -> RecordPayment {
        RecordPayment {
            bill_id,
            amount: self.payment_amount,
            payment_method: self.payment_method,
            notes: self.notes,
            actor: Actor::new(self.actor_name, self.actor_role),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveBillRequest {
    #[validate(length(min = 1, message = "Export path is required"))]
    pub export_path: String,
    #[validate(length(min = 1, message = "Actor name is required"))]
    pub actor_name: String,
    #[validate(length(min = 1, message = "Actor role is required"))]
    pub actor_role: String,
}

impl ArchiveBillRequest {
    pub fn into_input(self, bill_id: Uuid) -> ArchiveBill {
        ArchiveBill {
            bill_id,
            export_path: self.export_path,
            actor: Actor::new(self.actor_name, self.actor_role),
        }
    }
}
