use crate::commands::{open_pool, prepare, CommandResult, Failure};
use diplomas_db::{DemoSeedDataset, RequestSeedInfo};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;

        let seed_result = DemoSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result: Result<SeedOutput, Failure> = if verification.all_present {
            Ok(SeedOutput { seeded: seed_result.seeded, skipped: seed_result.skipped })
        } else {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            Err(("seed_verification", verification_message(&failed_checks), 6u8))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(output) => CommandResult::success("seed", output.message()),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

struct SeedOutput {
    seeded: Vec<RequestSeedInfo>,
    skipped: Vec<&'static str>,
}

impl SeedOutput {
    fn message(&self) -> String {
        let mut lines = vec!["demo validation requests ready:".to_string()];
        lines.extend(self.seeded.iter().map(|info| {
            format!("  - {}: {} ({})", info.request_id, info.student_id, info.description)
        }));
        if !self.skipped.is_empty() {
            lines.push(format!("  already present: {}", self.skipped.join(", ")));
        }
        lines.join("\n")
    }
}
