use clap::Args;
use tracing::debug;

use faultline_sampler::{ContextBuilder, SamplerConfig};

#[derive(Args)]
pub struct SampleCommand {
    /// Database connection URL
    #[arg(long, env = "FAULTLINE_DATABASE_URL")]
    pub database_url: String,

    /// Issue ids to sample, comma separated
    #[arg(long, value_delimiter = ',', required = true)]
    pub issue_ids: Vec<i32>,

    /// Override the per-issue sample limit
    #[arg(long)]
    pub per_issue_limit: Option<usize>,

    /// Override the global sample budget
    #[arg(long)]
    pub global_limit: Option<usize>,
}

impl SampleCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.run())
    }

    async fn run(self) -> anyhow::Result<()> {
        let db = faultline_database::establish_connection(&self.database_url).await?;

        let mut config = SamplerConfig::from_env();
        if let Some(per_issue_limit) = self.per_issue_limit {
            config.per_issue_limit = per_issue_limit;
        }
        if let Some(global_limit) = self.global_limit {
            config.global_limit = global_limit;
        }
        debug!(
            "Sampling {} issue(s) with per-issue limit {} and global limit {}",
            self.issue_ids.len(),
            config.per_issue_limit,
            config.global_limit
        );

        let builder = ContextBuilder::new(db, config);
        let corpus = builder.build_corpus(&self.issue_ids).await?;
        println!("{}", corpus);

        Ok(())
    }
}
