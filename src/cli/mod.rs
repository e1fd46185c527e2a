use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::application::RegistryService;
use crate::config::Config;
use crate::domain::{
    ApprovalStatus, Branch, ContactInfo, Entity, EntityKind, NewEntity, NewWholesaler,
    ProfileUpdate, ReferralOutcome, ServiceProvider, SocialMedia, Wholesaler,
    WholesalerDetailsUpdate, format_cents, parse_cents,
};

/// Barrim - provider and wholesaler registry
#[derive(Parser)]
#[command(name = "barrim")]
#[command(about = "Registry for service providers and wholesalers with approvals and referrals")]
#[command(version)]
pub struct Cli {
    /// Database file path (defaults to BARRIM_DATABASE, then barrim.db)
    #[arg(short, long)]
    pub database: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Service provider commands
    #[command(subcommand)]
    Provider(ProviderCommands),

    /// Wholesaler commands
    #[command(subcommand)]
    Wholesaler(WholesalerCommands),

    /// Approve a pending record
    Approve {
        /// Record kind: provider, wholesaler
        kind: String,

        /// Record ID
        id: Uuid,

        /// ID of the approving user
        #[arg(long)]
        approver: Uuid,
    },

    /// Reject a pending record
    Reject {
        /// Record kind: provider, wholesaler
        kind: String,

        /// Record ID
        id: Uuid,

        /// ID of the reviewing user
        #[arg(long)]
        approver: Uuid,

        /// Why the record was rejected
        #[arg(long)]
        reason: String,
    },

    /// Print a record as JSON
    Show {
        /// Record kind: provider, wholesaler
        kind: String,

        /// Record ID
        id: Uuid,
    },

    /// List records
    List {
        /// Record kind: provider, wholesaler
        kind: String,

        /// Filter by status: pending, approved, rejected
        #[arg(long)]
        status: Option<String>,
    },

    /// Edit shared profile fields of a record
    Profile {
        /// Record kind: provider, wholesaler
        kind: String,

        /// Record ID
        id: Uuid,

        #[command(flatten)]
        fields: ProfileArgs,
    },

    /// Referral code commands
    #[command(subcommand)]
    Referral(ReferralCommands),

    /// Apply a signed amount to a wholesaler's balance (e.g. "25.00" or "-10")
    Settle {
        /// Wholesaler ID
        id: Uuid,

        /// Amount to add; negative to withdraw
        #[arg(allow_hyphen_values = true)]
        amount: String,
    },

    /// Overwrite a wholesaler's points (administrative correction)
    Points {
        /// Wholesaler ID
        id: Uuid,

        /// New points total
        value: i64,
    },

    /// Branch management commands
    #[command(subcommand)]
    Branch(BranchCommands),
}

#[derive(clap::Args)]
pub struct OwnerArgs {
    /// Owning user ID
    #[arg(long)]
    pub owner: Uuid,

    /// Acting user ID, if different from the owner
    #[arg(long)]
    pub created_by: Option<Uuid>,

    /// Business name
    #[arg(long)]
    pub name: String,

    /// Category
    #[arg(short, long, default_value = "")]
    pub category: String,

    /// Contact email
    #[arg(long, default_value = "")]
    pub email: String,

    /// Contact address
    #[arg(long, default_value = "")]
    pub address: String,

    /// Logo URL
    #[arg(long)]
    pub logo: Option<String>,
}

#[derive(clap::Args)]
pub struct ProfileArgs {
    /// New business name
    #[arg(long)]
    pub name: Option<String>,

    /// New category
    #[arg(long)]
    pub category: Option<String>,

    /// New contact phone (replaces the whole contact block)
    #[arg(long)]
    pub phone: Option<String>,

    /// New contact email (replaces the whole contact block)
    #[arg(long)]
    pub email: Option<String>,

    /// New contact address (replaces the whole contact block)
    #[arg(long)]
    pub address: Option<String>,

    /// New logo URL; empty to clear
    #[arg(long)]
    pub logo: Option<String>,
}

#[derive(Subcommand)]
pub enum ProviderCommands {
    /// Register a service provider (starts pending)
    Submit {
        #[command(flatten)]
        owner: OwnerArgs,

        /// Contact phone
        #[arg(long, default_value = "")]
        phone: String,
    },
}

#[derive(Subcommand)]
pub enum WholesalerCommands {
    /// Register a wholesaler (starts pending)
    Submit {
        #[command(flatten)]
        owner: OwnerArgs,

        /// Primary phone
        #[arg(long)]
        phone: String,

        /// Sub-category
        #[arg(long)]
        sub_category: Option<String>,

        /// Extra phone numbers (repeatable)
        #[arg(long = "extra-phone")]
        extra_phones: Vec<String>,

        /// Extra emails (repeatable)
        #[arg(long = "extra-email")]
        extra_emails: Vec<String>,
    },

    /// Change wholesaler-only details
    Details {
        /// Wholesaler ID
        id: Uuid,

        #[command(flatten)]
        fields: DetailsArgs,
    },
}

#[derive(clap::Args)]
pub struct DetailsArgs {
    /// Primary phone
    #[arg(long)]
    pub phone: Option<String>,

    /// Sub-category; empty to clear
    #[arg(long)]
    pub sub_category: Option<String>,

    /// Extra phone numbers, replacing the current list (repeatable)
    #[arg(long = "extra-phone")]
    pub extra_phones: Vec<String>,

    /// Extra emails, replacing the current list (repeatable)
    #[arg(long = "extra-email")]
    pub extra_emails: Vec<String>,

    /// Facebook page
    #[arg(long)]
    pub facebook: Option<String>,

    /// Instagram handle
    #[arg(long)]
    pub instagram: Option<String>,

    /// WhatsApp number
    #[arg(long)]
    pub whatsapp: Option<String>,

    /// Website
    #[arg(long)]
    pub website: Option<String>,
}

#[derive(Subcommand)]
pub enum ReferralCommands {
    /// Issue a referral code for a record
    Issue {
        /// Record kind: provider, wholesaler
        kind: String,

        /// Record ID
        id: Uuid,

        /// Claim this exact code instead of generating one
        #[arg(long)]
        code: Option<String>,
    },

    /// Attribute a record to the wholesaler owning a referral code
    Register {
        /// Kind of the referred record: provider, wholesaler
        kind: String,

        /// Referred record ID
        id: Uuid,

        /// Referral code
        #[arg(long)]
        code: String,
    },

    /// Show which wholesaler referred a record
    Referrer {
        /// Referred record ID
        id: Uuid,
    },
}

#[derive(Subcommand)]
pub enum BranchCommands {
    /// Add a branch to a wholesaler
    Add {
        /// Wholesaler ID
        id: Uuid,

        /// Branch address
        #[arg(long)]
        address: String,

        /// Branch name
        #[arg(long, default_value = "")]
        name: String,

        /// Branch phone
        #[arg(long)]
        phone: Option<String>,

        /// Branch email
        #[arg(long)]
        email: Option<String>,
    },
}

impl Cli {
    pub async fn run(self, config: Config) -> Result<()> {
        let database = self.database.unwrap_or_else(|| config.database.clone());

        match self.command {
            Commands::Init => {
                RegistryService::init(&database).await?;
                println!("Database initialized: {}", database);
            }

            Commands::Provider(ProviderCommands::Submit { owner, phone }) => {
                let service = open_service(&database, &config).await?;
                let draft = owner.into_draft(phone);
                let provider = service.submit_service_provider(draft).await?;
                println!(
                    "Submitted service provider: {} ({})",
                    provider.record.business_name, provider.record.id
                );
            }

            Commands::Wholesaler(cmd) => {
                let service = open_service(&database, &config).await?;
                run_wholesaler_command(&service, cmd).await?;
            }

            Commands::Approve { kind, id, approver } => {
                let service = open_service(&database, &config).await?;
                match parse_kind(&kind)? {
                    EntityKind::ServiceProvider => {
                        print_review(&service.approve::<ServiceProvider>(id, approver).await?)
                    }
                    EntityKind::Wholesaler => {
                        print_review(&service.approve::<Wholesaler>(id, approver).await?)
                    }
                }
            }

            Commands::Reject {
                kind,
                id,
                approver,
                reason,
            } => {
                let service = open_service(&database, &config).await?;
                match parse_kind(&kind)? {
                    EntityKind::ServiceProvider => print_review(
                        &service
                            .reject::<ServiceProvider>(id, approver, &reason)
                            .await?,
                    ),
                    EntityKind::Wholesaler => {
                        print_review(&service.reject::<Wholesaler>(id, approver, &reason).await?)
                    }
                }
            }

            Commands::Show { kind, id } => {
                let service = open_service(&database, &config).await?;
                match parse_kind(&kind)? {
                    EntityKind::ServiceProvider => {
                        print_json(&service.get::<ServiceProvider>(id).await?)?
                    }
                    EntityKind::Wholesaler => print_json(&service.get::<Wholesaler>(id).await?)?,
                }
            }

            Commands::List { kind, status } => {
                let service = open_service(&database, &config).await?;
                let status = status.as_deref().map(parse_status).transpose()?;
                match parse_kind(&kind)? {
                    EntityKind::ServiceProvider => {
                        print_list(&service.list::<ServiceProvider>(status).await?)
                    }
                    EntityKind::Wholesaler => {
                        print_list(&service.list::<Wholesaler>(status).await?)
                    }
                }
            }

            Commands::Profile { kind, id, fields } => {
                let service = open_service(&database, &config).await?;
                let update = fields.into_update();
                match parse_kind(&kind)? {
                    EntityKind::ServiceProvider => print_review(
                        &service
                            .update_profile::<ServiceProvider>(id, update)
                            .await?,
                    ),
                    EntityKind::Wholesaler => {
                        print_review(&service.update_profile::<Wholesaler>(id, update).await?)
                    }
                }
            }

            Commands::Referral(cmd) => {
                let service = open_service(&database, &config).await?;
                run_referral_command(&service, cmd).await?;
            }

            Commands::Settle { id, amount } => {
                let service = open_service(&database, &config).await?;
                let delta =
                    parse_cents(&amount).context("Invalid amount format. Use '25.00' or '-10'")?;
                let wholesaler = service.settle_balance(id, delta).await?;
                println!(
                    "{}: balance {} ({}{})",
                    wholesaler.record.business_name,
                    format_cents(wholesaler.balance),
                    if delta > 0 { "+" } else { "" },
                    format_cents(delta)
                );
            }

            Commands::Points { id, value } => {
                let service = open_service(&database, &config).await?;
                let wholesaler = service.correct_points(id, value).await?;
                println!(
                    "{}: points set to {}",
                    wholesaler.record.business_name, wholesaler.points
                );
            }

            Commands::Branch(BranchCommands::Add {
                id,
                address,
                name,
                phone,
                email,
            }) => {
                let service = open_service(&database, &config).await?;
                let mut branch = Branch::new(name, address);
                if let Some(phone) = phone {
                    branch = branch.with_phone(phone);
                }
                if let Some(email) = email {
                    branch = branch.with_email(email);
                }
                let added = service.add_branch(id, branch).await?;
                println!(
                    "{}: {} branch(es)",
                    added.wholesaler.record.business_name,
                    added.wholesaler.branches.len()
                );
                for address in added.duplicate_addresses {
                    println!("  warning: several branches at '{}', consider merging", address);
                }
            }
        }

        Ok(())
    }
}

async fn open_service(database: &str, config: &Config) -> Result<RegistryService> {
    let service = RegistryService::connect(database)
        .await?
        .with_policy(config.policy());
    Ok(service)
}

impl OwnerArgs {
    fn into_draft(self, phone: String) -> NewEntity {
        let contact = ContactInfo::new(phone, self.email).with_address(self.address);
        let mut draft = NewEntity::new(self.owner, self.name, self.category, contact);
        if let Some(actor) = self.created_by {
            draft = draft.with_created_by(actor);
        }
        if let Some(logo) = self.logo {
            draft = draft.with_logo_url(logo);
        }
        draft
    }
}

impl ProfileArgs {
    fn into_update(self) -> ProfileUpdate {
        let contact_info = if self.phone.is_some() || self.email.is_some() || self.address.is_some() {
            Some(
                ContactInfo::new(self.phone.unwrap_or_default(), self.email.unwrap_or_default())
                    .with_address(self.address.unwrap_or_default()),
            )
        } else {
            None
        };

        ProfileUpdate {
            business_name: self.name,
            category: self.category,
            contact_info,
            logo_url: self.logo,
        }
    }
}

impl DetailsArgs {
    fn into_update(self) -> WholesalerDetailsUpdate {
        let social = SocialMedia {
            facebook: self.facebook,
            instagram: self.instagram,
            whatsapp: self.whatsapp,
            website: self.website,
        };

        WholesalerDetailsUpdate {
            phone: self.phone,
            sub_category: self.sub_category,
            additional_phones: Some(self.extra_phones).filter(|v| !v.is_empty()),
            additional_emails: Some(self.extra_emails).filter(|v| !v.is_empty()),
            social_media: if social.is_empty() { None } else { Some(social) },
        }
    }
}

async fn run_wholesaler_command(service: &RegistryService, cmd: WholesalerCommands) -> Result<()> {
    match cmd {
        WholesalerCommands::Submit {
            owner,
            phone,
            sub_category,
            extra_phones,
            extra_emails,
        } => {
            let mut draft = NewWholesaler::new(owner.into_draft(String::new()), phone)
                .with_additional_phones(extra_phones)
                .with_additional_emails(extra_emails);
            if let Some(sub) = sub_category {
                draft = draft.with_sub_category(sub);
            }

            let wholesaler = service.submit_wholesaler(draft).await?;
            println!(
                "Submitted wholesaler: {} ({})",
                wholesaler.record.business_name, wholesaler.record.id
            );
        }

        WholesalerCommands::Details { id, fields } => {
            let update = fields.into_update();
            let wholesaler = service.update_wholesaler_details(id, update).await?;
            println!("Updated wholesaler: {}", wholesaler.record.business_name);
        }
    }
    Ok(())
}

async fn run_referral_command(service: &RegistryService, cmd: ReferralCommands) -> Result<()> {
    match cmd {
        ReferralCommands::Issue { kind, id, code } => {
            let issued = match parse_kind(&kind)? {
                EntityKind::ServiceProvider => service
                    .issue_referral_code::<ServiceProvider>(id, code.as_deref())
                    .await?
                    .record
                    .referral_code,
                EntityKind::Wholesaler => service
                    .issue_referral_code::<Wholesaler>(id, code.as_deref())
                    .await?
                    .record
                    .referral_code,
            };
            println!("Referral code: {}", issued.unwrap_or_default());
        }

        ReferralCommands::Register { kind, id, code } => {
            let result = match parse_kind(&kind)? {
                EntityKind::ServiceProvider => {
                    service
                        .register_with_referral::<ServiceProvider>(id, &code)
                        .await?
                }
                EntityKind::Wholesaler => {
                    service.register_with_referral::<Wholesaler>(id, &code).await?
                }
            };
            let verb = match result.outcome {
                ReferralOutcome::Recorded => "Recorded",
                ReferralOutcome::AlreadyRecorded => "Already recorded",
            };
            println!(
                "{} referral by {}: {} referral(s), {} point(s)",
                verb,
                result.referrer.record.business_name,
                result.referrer.referrals.len(),
                result.referrer.points
            );
        }

        ReferralCommands::Referrer { id } => match service.find_referrer(id).await? {
            Some(w) => println!("{} ({})", w.record.business_name, w.record.id),
            None => println!("No referrer recorded for {}", id),
        },
    }
    Ok(())
}

fn print_review<E: Entity>(entity: &E) {
    let record = entity.record();
    println!(
        "{} {}: {} [{}]",
        E::KIND,
        record.id,
        record.business_name,
        record.status
    );
    if let Some(reason) = &record.rejection_reason {
        println!("  Reason: {}", reason);
    }
}

fn print_list<E: Entity>(entities: &[E]) {
    if entities.is_empty() {
        println!("No records found.");
        return;
    }
    println!("{:<36}  {:<24} {:<9} {:<12}", "ID", "NAME", "STATUS", "CODE");
    println!("{}", "-".repeat(84));
    for entity in entities {
        let record = entity.record();
        println!(
            "{:<36}  {:<24} {:<9} {:<12}",
            record.id,
            truncate(&record.business_name, 24),
            record.status,
            record.referral_code.as_deref().unwrap_or("-")
        );
    }
}

fn print_json<E: Entity>(entity: &E) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(entity)?);
    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

fn parse_kind(kind: &str) -> Result<EntityKind> {
    EntityKind::from_str(kind).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid record kind '{}'. Valid kinds: provider, wholesaler",
            kind
        )
    })
}

fn parse_status(status: &str) -> Result<ApprovalStatus> {
    ApprovalStatus::from_str(status).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid status '{}'. Valid statuses: pending, approved, rejected",
            status
        )
    })
}
