use chrono::{Local, NaiveDate, NaiveDateTime};
use clap::Parser;
use loanbook::application::stager::DelinquencySweep;
use loanbook::application::workflow::{
    ConfirmationWorkflow, CreateLoan, Decision, SubmitPayment,
};
use loanbook::domain::access::AccessScope;
use loanbook::domain::client::{ClientRecord, PreferredChannel};
use loanbook::domain::loan::{LoanTerms, PaymentFrequency};
use loanbook::domain::money::{Amount, Money};
use loanbook::domain::notification::NotificationSettings;
use loanbook::domain::payment::PaymentKind;
use loanbook::domain::ports::{ClientStore, InstallmentStore, LoanStore};
use loanbook::error::{LendingError, Result as LendingResult};
use loanbook::infrastructure::in_memory::{
    InMemoryClientStore, InMemoryInstallmentStore, InMemoryLoanStore, InMemoryNotificationLog,
    InMemoryPaymentStore, TracingSender,
};
use loanbook::interfaces::csv::event_reader::{EventReader, EventRecord, EventType};
use loanbook::interfaces::csv::schedule_writer::ScheduleWriter;
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input loan-event CSV file
    input: PathBuf,

    /// Fixed administrative fee charged on every installment
    #[arg(long, default_value = "20")]
    admin_fee: Decimal,

    /// Process confirmations and the sweep as of this date (defaults to today)
    #[arg(long)]
    as_of: Option<NaiveDate>,

    /// Run the delinquency sweep after processing all events
    #[arg(long)]
    sweep: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let now = cli
        .as_of
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .unwrap_or_else(|| Local::now().naive_local());

    let loans = InMemoryLoanStore::new();
    let installments = InMemoryInstallmentStore::new();
    let payments = InMemoryPaymentStore::new();
    let clients = InMemoryClientStore::new();
    let log = InMemoryNotificationLog::new();

    let workflow = ConfirmationWorkflow::new(
        Box::new(loans.clone()),
        Box::new(installments.clone()),
        Box::new(payments.clone()),
        Box::new(clients.clone()),
        Box::new(TracingSender),
    );

    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = EventReader::new(file);
    for event_result in reader.events() {
        match event_result {
            Ok(event) => {
                if let Err(e) =
                    process_event(&workflow, &clients, &event, cli.admin_fee, now).await
                {
                    eprintln!("Error processing event: {e}");
                }
            }
            Err(e) => {
                eprintln!("Error reading event: {e}");
            }
        }
    }

    if cli.sweep {
        let sweep = DelinquencySweep::new(
            Box::new(loans.clone()),
            Box::new(installments.clone()),
            Box::new(clients.clone()),
            Box::new(log.clone()),
            Box::new(TracingSender),
            NotificationSettings::default(),
        );
        let summary = sweep.run(now).await.into_diagnostic()?;
        eprintln!(
            "Sweep: {} evaluated, {} sent, {} failed, {} ignored",
            summary.evaluated, summary.sent, summary.failed, summary.ignored
        );
    }

    let all_loans = loans.all().await.into_diagnostic()?;
    let all_installments = installments.all().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = ScheduleWriter::new(stdout.lock());
    writer
        .write_state(&all_loans, &all_installments)
        .into_diagnostic()?;

    Ok(())
}

async fn process_event(
    workflow: &ConfirmationWorkflow,
    clients: &InMemoryClientStore,
    event: &EventRecord,
    admin_fee: Decimal,
    now: NaiveDateTime,
) -> LendingResult<()> {
    let scope = AccessScope::Admin;
    match event.r#type {
        EventType::Create => {
            let client_id = event
                .client
                .clone()
                .ok_or_else(|| LendingError::Validation("create requires a client".to_string()))?;
            // The CLI registers unknown clients on the fly; a real deployment
            // manages the client book elsewhere.
            if clients.get(&client_id).await?.is_none() {
                clients
                    .store(ClientRecord {
                        id: client_id.clone(),
                        name: client_id.clone(),
                        advisor_id: None,
                        phone: None,
                        sms_opt_in: false,
                        whatsapp_opt_in: false,
                        preferred_channel: PreferredChannel::Both,
                    })
                    .await?;
            }
            let terms = LoanTerms {
                principal: Money::new(required(event.amount, "amount")?),
                monthly_rate_pct: required(event.rate, "rate")?,
                term: required(event.term, "term")?,
                frequency: event.frequency.unwrap_or(PaymentFrequency::Monthly),
                start_date: required(event.date, "date")?,
                admin_fee: Money::new(admin_fee),
            };
            workflow
                .create_loan(
                    &scope,
                    CreateLoan {
                        loan_id: event.loan.clone(),
                        client_id,
                        terms,
                    },
                )
                .await?;
        }
        EventType::Activate => {
            workflow.activate_loan(&scope, &event.loan).await?;
        }
        EventType::Submit => {
            let installment = required(event.installment, "installment")?;
            let amount = Amount::new(required(event.amount, "amount")?)?;
            workflow
                .submit_payment(
                    &scope,
                    SubmitPayment {
                        loan_id: event.loan.clone(),
                        kind: PaymentKind::Single { installment },
                        amount: Some(amount),
                        method: "cash".to_string(),
                        date: event.date.unwrap_or_else(|| now.date()),
                        notes: event.reason.clone(),
                    },
                )
                .await?;
        }
        EventType::Payoff => {
            let targets: Vec<u32> = workflow
                .installment_store()
                .for_loan(&event.loan)
                .await?
                .iter()
                .filter(|i| !i.is_paid())
                .map(|i| i.number)
                .collect();
            workflow
                .submit_payment(
                    &scope,
                    SubmitPayment {
                        loan_id: event.loan.clone(),
                        kind: PaymentKind::FullPayoff {
                            installments: targets,
                        },
                        amount: None,
                        method: "cash".to_string(),
                        date: event.date.unwrap_or_else(|| now.date()),
                        notes: event.reason.clone(),
                    },
                )
                .await?;
        }
        EventType::Approve | EventType::Reject => {
            let installment = required(event.installment, "installment")?;
            let payment = workflow
                .payment_store()
                .latest_for_installment(&event.loan, installment)
                .await?
                .ok_or_else(|| {
                    LendingError::NotFound(format!(
                        "no payment for installment {}#{installment}",
                        event.loan
                    ))
                })?;
            let decision = match event.r#type {
                EventType::Approve => Decision::Approve,
                _ => Decision::Reject {
                    reason: event.reason.clone().unwrap_or_default(),
                },
            };
            let outcome = workflow
                .confirm_payment(&scope, payment.id, decision, now)
                .await?;
            for warning in outcome.warnings {
                eprintln!("Warning: {warning}");
            }
        }
    }
    Ok(())
}

fn required<T>(value: Option<T>, field: &str) -> LendingResult<T> {
    value.ok_or_else(|| LendingError::Validation(format!("{field} is required")))
}
