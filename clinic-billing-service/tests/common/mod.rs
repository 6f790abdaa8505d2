//! Test helper module for clinic-billing-service integration tests.
//!
//! Every test gets its own in-memory store seeded with a small catalog,
//! patients and documentations.

#![allow(dead_code)]

use chrono::Utc;
use clinic_billing_service::billing::{BillingEngine, CreateBill, DayBoundary, UpdateBill};
use clinic_billing_service::config::BillingConfig;
use clinic_billing_service::models::{
    Actor, MedicalDocumentation, Patient, Service, ServiceLineInput,
};
use clinic_billing_service::services::{init_metrics, BillingStore, MemoryStore};
use clinic_billing_service::startup::Application;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn actor() -> Actor {
    Actor::new("Maria Santos", "cashier")
}

/// Catalog entries seeded into every store.
pub struct Catalog {
    /// Laboratory, 300.00
    pub cbc: Uuid,
    /// Imaging, 500.00
    pub xray: Uuid,
    /// Laboratory, 333.333
    pub urinalysis: Uuid,
    pub deactivated: Uuid,
    pub out_of_stock: Uuid,
}

/// Test application wrapper for integration tests.
pub struct TestApp {
    pub store: MemoryStore,
    pub engine: BillingEngine,
    pub catalog: Catalog,
    pub patient_id: Uuid,
    pub senior_patient_id: Uuid,
}

impl TestApp {
    pub async fn new() -> Self {
        init_metrics();

        let store = MemoryStore::new();
        let catalog = Catalog {
            cbc: seed_service(&store, "Complete Blood Count", "laboratory", "300.00", true, true)
                .await,
            xray: seed_service(&store, "Chest X-Ray", "imaging", "500.00", true, true).await,
            urinalysis: seed_service(&store, "Urinalysis", "laboratory", "333.333", true, true)
                .await,
            deactivated: seed_service(&store, "Lipid Panel", "laboratory", "800.00", false, true)
                .await,
            out_of_stock: seed_service(&store, "Flu Vaccine", "vaccination", "1200.00", true, false)
                .await,
        };

        let patient_id = seed_patient(&store, None).await;
        let senior_patient_id = seed_patient(&store, Some("SC-2031-0077")).await;

        let shared: Arc<dyn BillingStore> = Arc::new(store.clone());
        let engine = BillingEngine::new(shared, DayBoundary::utc(), Duration::from_secs(30));

        Self {
            store,
            engine,
            catalog,
            patient_id,
            senior_patient_id,
        }
    }

    /// Finalized documentation for the regular patient.
    pub async fn documentation(&self) -> Uuid {
        seed_documentation(&self.store, self.patient_id, "finalized").await
    }

    /// Finalized documentation for the patient with a senior/PWD ID.
    pub async fn senior_documentation(&self) -> Uuid {
        seed_documentation(&self.store, self.senior_patient_id, "finalized").await
    }

    pub async fn draft_documentation(&self) -> Uuid {
        seed_documentation(&self.store, self.patient_id, "draft").await
    }

    pub fn create_input(&self, documentation_id: Uuid, lines: &[(Uuid, &str)]) -> CreateBill {
        CreateBill {
            documentation_id,
            services: lines
                .iter()
                .map(|(service_id, quantity)| ServiceLineInput {
                    service_id: *service_id,
                    quantity: dec(quantity),
                })
                .collect(),
            notes: None,
            initial_payment_amount: None,
            payment_method: None,
            consultation_fee: None,
            is_senior_pwd_discount_applied: None,
            discount_rate: None,
            cleanup_documentation_on_failure: false,
            actor: actor(),
        }
    }

    pub fn update_input(&self, bill_id: Uuid) -> UpdateBill {
        UpdateBill::new(bill_id, actor())
    }

    /// Serve the HTTP API over this app's store on a random port.
    pub async fn spawn_http(&self) -> String {
        let mut config = BillingConfig::for_tests();
        config.common.port = 0;

        let shared: Arc<dyn BillingStore> = Arc::new(self.store.clone());
        let app = Application::with_store(config, shared)
            .await
            .expect("Failed to build test application");
        let address = format!("http://127.0.0.1:{}", app.port());

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        address
    }
}

async fn seed_service(
    store: &MemoryStore,
    name: &str,
    category: &str,
    price: &str,
    is_activated: bool,
    is_available: bool,
) -> Uuid {
    let service_id = Uuid::new_v4();
    store
        .insert_service(Service {
            service_id,
            name: name.to_string(),
            category: category.to_string(),
            price: dec(price),
            is_activated,
            is_available,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        })
        .await;
    service_id
}

async fn seed_patient(store: &MemoryStore, senior_pwd_id: Option<&str>) -> Uuid {
    let patient_id = Uuid::new_v4();
    store
        .insert_patient(Patient {
            patient_id,
            first_name: "Juan".to_string(),
            last_name: "Dela Cruz".to_string(),
            senior_pwd_id: senior_pwd_id.map(str::to_string),
        })
        .await;
    patient_id
}

async fn seed_documentation(store: &MemoryStore, patient_id: Uuid, status: &str) -> Uuid {
    let documentation_id = Uuid::new_v4();
    store
        .insert_documentation(MedicalDocumentation {
            documentation_id,
            patient_id,
            status: status.to_string(),
            created_utc: Utc::now(),
        })
        .await;
    documentation_id
}
