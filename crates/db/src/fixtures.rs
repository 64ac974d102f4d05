use chrono::{DateTime, Duration, TimeZone, Utc};

use diplomas_core::approvals::{ApprovalEngine, Decision, RequiredRoleMatcher};
use diplomas_core::domain::approval::{ApprovalStatus, Approver};
use diplomas_core::domain::request::{RequestId, StudentId, ValidationRequest};
use diplomas_core::domain::template::ChainTemplate;
use diplomas_core::notifications::{Notification, NotificationId};

use crate::connection::DbPool;
use crate::repositories::notification::write_notification;
use crate::repositories::request::insert_request;
use crate::repositories::{
    RepositoryError, SqlValidationRequestRepository, ValidationRequestRepository,
};

const SIGNERS: [(&str, &str); 5] = [
    ("Mme Diop", "accueil"),
    ("M. Sarr", "scolarite"),
    ("Pr. Ndiaye", "chef_departement"),
    ("Mme Faye", "comptabilite"),
    ("M. Gueye", "directeur"),
];

/// Demo requests covering every chain state.
const SEED_REQUESTS: &[SeedRequestContract] = &[
    SeedRequestContract {
        request_id: "VR-SEED-001",
        student_id: "STU-2026-001",
        decisions: &[Decision::Approve; 5],
        rejection_comment: None,
        status: ApprovalStatus::Completed,
        progress: 100,
        description: "All five signatures obtained",
    },
    SeedRequestContract {
        request_id: "VR-SEED-002",
        student_id: "STU-2026-002",
        decisions: &[Decision::Approve; 3],
        rejection_comment: None,
        status: ApprovalStatus::Pending,
        progress: 60,
        description: "Waiting on the accounting office",
    },
    SeedRequestContract {
        request_id: "VR-SEED-003",
        student_id: "STU-2026-003",
        decisions: &[],
        rejection_comment: None,
        status: ApprovalStatus::Pending,
        progress: 0,
        description: "Just submitted",
    },
    SeedRequestContract {
        request_id: "VR-SEED-004",
        student_id: "STU-2026-004",
        decisions: &[Decision::Approve, Decision::Approve, Decision::Reject],
        rejection_comment: Some("Relevé de notes du semestre 6 manquant"),
        status: ApprovalStatus::Rejected,
        progress: 40,
        description: "Rejected by the department head",
    },
];

#[derive(Debug, Clone, Copy)]
struct SeedRequestContract {
    request_id: &'static str,
    student_id: &'static str,
    decisions: &'static [Decision],
    rejection_comment: Option<&'static str>,
    status: ApprovalStatus,
    progress: u8,
    description: &'static str,
}

fn seed_base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 9, 1, 8, 0, 0).single().unwrap_or_default()
}

/// Deterministic demo dataset: four requests, one per chain state, plus the
/// notices their decisions produced.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    /// Loads the dataset. Requests that already exist are left untouched.
    ///
    /// Each request is stored together with its notices in one transaction.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut seeded = Vec::new();
        let mut skipped = Vec::new();

        for (index, contract) in SEED_REQUESTS.iter().enumerate() {
            let submitted_at = seed_base_time() + Duration::days(index as i64);
            let (request, notices) = build_request(contract, submitted_at)?;

            let mut tx = pool.begin().await?;
            match insert_request(&mut tx, &request).await {
                Ok(()) => {}
                Err(RepositoryError::AlreadyExists(_)) => {
                    tx.rollback().await?;
                    skipped.push(contract.request_id);
                    continue;
                }
                Err(error) => return Err(error),
            }
            for notice in &notices {
                write_notification(&mut tx, notice).await?;
            }
            tx.commit().await?;
            seeded.push(RequestSeedInfo {
                request_id: contract.request_id,
                student_id: contract.student_id,
                description: contract.description,
            });
        }

        Ok(SeedResult { seeded, skipped })
    }

    /// Checks that every seeded request is stored with its expected state.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let requests = SqlValidationRequestRepository::new(pool.clone());
        let mut checks = Vec::new();

        for contract in SEED_REQUESTS {
            let stored = requests.find_by_id(&RequestId(contract.request_id.to_string())).await?;
            let matches = stored.as_ref().is_some_and(|request| {
                request.status() == contract.status
                    && request.chain.progress() == contract.progress
                    && request.version == 1 + contract.decisions.len() as u64
            });
            checks.push((contract.request_id, matches));

            let notice_count: i64 =
                sqlx::query_scalar("SELECT COUNT(1) FROM notification WHERE request_id = ?1")
                    .bind(contract.request_id)
                    .fetch_one(pool)
                    .await?;
            checks.push((
                contract.student_id,
                notice_count == contract.decisions.len() as i64,
            ));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the seeded requests; steps and notices go with them.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        for contract in SEED_REQUESTS {
            sqlx::query("DELETE FROM validation_request WHERE id = ?1")
                .bind(contract.request_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn build_request(
    contract: &SeedRequestContract,
    submitted_at: DateTime<Utc>,
) -> Result<(ValidationRequest, Vec<Notification>), RepositoryError> {
    let engine = ApprovalEngine::<RequiredRoleMatcher>::default();
    let chain = ChainTemplate::default()
        .instantiate()
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;
    let mut request = ValidationRequest::submit(
        RequestId(contract.request_id.to_string()),
        StudentId(contract.student_id.to_string()),
        chain,
        submitted_at,
    );
    let mut notices = Vec::new();

    for (position, (decision, (name, role))) in
        contract.decisions.iter().zip(SIGNERS).enumerate()
    {
        let decided_at = submitted_at + Duration::days(position as i64 + 1);
        let comment = match decision {
            Decision::Reject => contract.rejection_comment.unwrap_or_default(),
            Decision::Approve => "",
        };
        let step_id = (position + 1) as u32;
        let chain = engine
            .apply(&request.chain, *decision, &Approver::new(name, role), comment, decided_at)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;
        request = ValidationRequest {
            version: request.version + 1,
            ..request.with_chain(chain, decided_at)
        };

        if let Some(step) = request.chain.step(step_id) {
            notices.push(Notification {
                id: NotificationId(format!("NTF-{}-{step_id}", contract.request_id)),
                ..Notification::for_decision(&request, step, *decision, decided_at)
            });
        }
    }

    Ok((request, notices))
}

#[derive(Debug)]
pub struct SeedResult {
    pub seeded: Vec<RequestSeedInfo>,
    pub skipped: Vec<&'static str>,
}

#[derive(Debug)]
pub struct RequestSeedInfo {
    pub request_id: &'static str,
    pub student_id: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
