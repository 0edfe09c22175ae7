use sea_orm_migration::prelude::*;

/// Creates the core schema: projects, issues, and exceptions.
#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create projects table
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("projects"))
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alias::new("id"))
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Alias::new("name")).string().not_null())
                    .col(ColumnDef::new(Alias::new("slug")).string().not_null())
                    .col(
                        ColumnDef::new(Alias::new("created_at"))
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("updated_at"))
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_projects_slug_unique")
                    .table(Alias::new("projects"))
                    .col(Alias::new("slug"))
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Create issues table
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("issues"))
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alias::new("id"))
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("project_id"))
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Alias::new("name")).string().not_null())
                    .col(
                        ColumnDef::new(Alias::new("status"))
                            .text()
                            .not_null()
                            .default("open"),
                    )
                    .col(
                        ColumnDef::new(Alias::new("severity"))
                            .text()
                            .not_null()
                            .default("medium"),
                    )
                    .col(
                        ColumnDef::new(Alias::new("first_seen"))
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("last_seen"))
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("event_count"))
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Alias::new("created_at"))
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("updated_at"))
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_issues_project_id")
                            .from(Alias::new("issues"), Alias::new("project_id"))
                            .to(Alias::new("projects"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Aggregation relies on this unique index; the find-or-create path
        // falls back to a re-query when a concurrent insert wins the race.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_issues_project_id_name_unique")
                    .table(Alias::new("issues"))
                    .col(Alias::new("project_id"))
                    .col(Alias::new("name"))
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Create exceptions table
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("exceptions"))
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alias::new("id"))
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("project_id"))
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Alias::new("issue_id")).integer().null())
                    .col(ColumnDef::new(Alias::new("environment")).text().not_null())
                    .col(ColumnDef::new(Alias::new("platform")).text().null())
                    .col(ColumnDef::new(Alias::new("name")).string().not_null())
                    .col(ColumnDef::new(Alias::new("message")).text().not_null())
                    .col(ColumnDef::new(Alias::new("details")).text().null())
                    .col(ColumnDef::new(Alias::new("stack_trace")).text().null())
                    .col(ColumnDef::new(Alias::new("frames")).json_binary().null())
                    .col(ColumnDef::new(Alias::new("url")).string().null())
                    .col(ColumnDef::new(Alias::new("method")).text().null())
                    .col(ColumnDef::new(Alias::new("status")).string().null())
                    .col(ColumnDef::new(Alias::new("status_code")).integer().null())
                    .col(ColumnDef::new(Alias::new("client_ip")).string().null())
                    .col(ColumnDef::new(Alias::new("response_body")).text().null())
                    .col(
                        ColumnDef::new(Alias::new("created_at"))
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_exceptions_project_id")
                            .from(Alias::new("exceptions"), Alias::new("project_id"))
                            .to(Alias::new("projects"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_exceptions_issue_id")
                            .from(Alias::new("exceptions"), Alias::new("issue_id"))
                            .to(Alias::new("issues"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // Sampler queries read newest-first per issue
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_exceptions_issue_id_created_at")
                    .table(Alias::new("exceptions"))
                    .col(Alias::new("issue_id"))
                    .col(Alias::new("created_at"))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_exceptions_project_id_created_at")
                    .table(Alias::new("exceptions"))
                    .col(Alias::new("project_id"))
                    .col(Alias::new("created_at"))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alias::new("exceptions")).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Alias::new("issues")).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Alias::new("projects")).to_owned())
            .await?;
        Ok(())
    }
}
