use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_branches_table::Migration),
            Box::new(m20240101_000002_create_customers_table::Migration),
            Box::new(m20240101_000003_create_refractions_table::Migration),
            Box::new(m20240101_000004_create_orders_table::Migration),
            Box::new(m20240101_000005_create_order_items_table::Migration),
            Box::new(m20240101_000006_create_stock_records_table::Migration),
            Box::new(m20240101_000007_create_stock_movements_table::Migration),
            Box::new(m20240101_000008_create_payments_table::Migration),
            Box::new(m20240101_000009_create_refund_expenses_table::Migration),
            Box::new(m20240101_000010_create_sequence_counters_table::Migration),
            Box::new(m20240101_000011_create_order_progress_table::Migration),
            Box::new(m20240101_000012_create_mnt_records_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_branches_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_branches_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Branches::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Branches::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Branches::Name).string().not_null())
                        .col(ColumnDef::new(Branches::Code).string().not_null())
                        .col(ColumnDef::new(Branches::Phone).string().null())
                        .col(ColumnDef::new(Branches::Address).string().null())
                        .col(
                            ColumnDef::new(Branches::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Branches::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Branches::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_branches_code")
                        .table(Branches::Table)
                        .col(Branches::Code)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Branches::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Branches {
        Table,
        Id,
        Name,
        Code,
        Phone,
        Address,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_customers_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_customers_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Customers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Customers::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Customers::Name).string().not_null())
                        .col(ColumnDef::new(Customers::Phone).string().not_null())
                        .col(ColumnDef::new(Customers::Email).string().null())
                        .col(
                            ColumnDef::new(Customers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Customers::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Lookup-or-create key for inbound orders
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_customers_phone_name")
                        .table(Customers::Table)
                        .col(Customers::Phone)
                        .col(Customers::Name)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Customers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Customers {
        Table,
        Id,
        Name,
        Phone,
        Email,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_refractions_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_refractions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Refractions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Refractions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Refractions::RefractionNumber)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Refractions::BranchId).uuid().not_null())
                        .col(ColumnDef::new(Refractions::CustomerId).uuid().not_null())
                        .col(ColumnDef::new(Refractions::Notes).string().null())
                        .col(
                            ColumnDef::new(Refractions::CreatedAt)
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
                        .name("idx_refractions_branch_id")
                        .table(Refractions::Table)
                        .col(Refractions::BranchId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Refractions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Refractions {
        Table,
        Id,
        RefractionNumber,
        BranchId,
        CustomerId,
        Notes,
        CreatedAt,
    }
}

mod m20240101_000004_create_orders_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::BranchId).uuid().not_null())
                        .col(ColumnDef::new(Orders::CustomerId).uuid().not_null())
                        .col(ColumnDef::new(Orders::RefractionId).uuid().null())
                        .col(ColumnDef::new(Orders::InvoiceNumber).string().not_null())
                        .col(
                            ColumnDef::new(Orders::Subtotal)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::Discount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::TotalPrice)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::TotalPayment)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::OnHold)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Orders::Urgent)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Orders::Status).string().not_null())
                        .col(ColumnDef::new(Orders::FittingStatus).string().not_null())
                        .col(
                            ColumnDef::new(Orders::IsDeleted)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Orders::DeletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Orders::DeletedBy).uuid().null())
                        .col(
                            ColumnDef::new(Orders::IsRefund)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Orders::RefundedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Orders::RefundReason).string().null())
                        .col(ColumnDef::new(Orders::CreatedBy).uuid().null())
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_branch_id")
                        .table(Orders::Table)
                        .col(Orders::BranchId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_customer_id")
                        .table(Orders::Table)
                        .col(Orders::CustomerId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_invoice_number")
                        .table(Orders::Table)
                        .col(Orders::InvoiceNumber)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Orders {
        Table,
        Id,
        BranchId,
        CustomerId,
        RefractionId,
        InvoiceNumber,
        Subtotal,
        Discount,
        TotalPrice,
        TotalPayment,
        OnHold,
        Urgent,
        Status,
        FittingStatus,
        IsDeleted,
        DeletedAt,
        DeletedBy,
        IsRefund,
        RefundedAt,
        RefundReason,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000005_create_order_items_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_order_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::LineId).uuid().not_null())
                        .col(
                            ColumnDef::new(OrderItems::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(OrderItems::StockItemId).uuid().null())
                        .col(ColumnDef::new(OrderItems::ItemClass).string().null())
                        .col(ColumnDef::new(OrderItems::ExternalLensId).uuid().null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(ColumnDef::new(OrderItems::PricePerUnit).decimal().not_null())
                        .col(ColumnDef::new(OrderItems::Subtotal).decimal().not_null())
                        .col(
                            ColumnDef::new(OrderItems::IsNonStock)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(OrderItems::IsRefund)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(OrderItems::Note).string().null())
                        .col(ColumnDef::new(OrderItems::SerialNumber).string().null())
                        .col(ColumnDef::new(OrderItems::Battery).string().null())
                        .col(ColumnDef::new(OrderItems::NextServiceDate).date().null())
                        .col(
                            ColumnDef::new(OrderItems::IsDeleted)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(OrderItems::DeletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(OrderItems::DeletedBy).uuid().null())
                        .col(
                            ColumnDef::new(OrderItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await?;

            // Version lookup per logical line
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_line_id_version")
                        .table(OrderItems::Table)
                        .col(OrderItems::LineId)
                        .col(OrderItems::Version)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum OrderItems {
        Table,
        Id,
        OrderId,
        LineId,
        Version,
        StockItemId,
        ItemClass,
        ExternalLensId,
        Quantity,
        PricePerUnit,
        Subtotal,
        IsNonStock,
        IsRefund,
        Note,
        SerialNumber,
        Battery,
        NextServiceDate,
        IsDeleted,
        DeletedAt,
        DeletedBy,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000006_create_stock_records_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000006_create_stock_records_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockRecords::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockRecords::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockRecords::StockItemId).uuid().not_null())
                        .col(ColumnDef::new(StockRecords::ItemClass).string().not_null())
                        .col(ColumnDef::new(StockRecords::BranchId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockRecords::Quantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(StockRecords::InitialCount).integer().null())
                        .col(ColumnDef::new(StockRecords::StockLimit).integer().null())
                        .col(
                            ColumnDef::new(StockRecords::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockRecords::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_records_item_branch")
                        .table(StockRecords::Table)
                        .col(StockRecords::StockItemId)
                        .col(StockRecords::BranchId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockRecords::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum StockRecords {
        Table,
        Id,
        StockItemId,
        ItemClass,
        BranchId,
        Quantity,
        InitialCount,
        StockLimit,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000007_create_stock_movements_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000007_create_stock_movements_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockMovements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::StockItemId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::ItemClass)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::BranchId).uuid().not_null())
                        .col(ColumnDef::new(StockMovements::Action).string().not_null())
                        .col(
                            ColumnDef::new(StockMovements::QuantityChanged)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::TransferToBranchId)
                                .uuid()
                                .null(),
                        )
                        .col(ColumnDef::new(StockMovements::RecordedBy).uuid().null())
                        .col(
                            ColumnDef::new(StockMovements::CreatedAt)
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
                        .name("idx_stock_movements_item_branch")
                        .table(StockMovements::Table)
                        .col(StockMovements::StockItemId)
                        .col(StockMovements::BranchId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockMovements::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum StockMovements {
        Table,
        Id,
        StockItemId,
        ItemClass,
        BranchId,
        Action,
        QuantityChanged,
        TransferToBranchId,
        RecordedBy,
        CreatedAt,
    }
}

mod m20240101_000008_create_payments_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000008_create_payments_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Payments::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Payments::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Payments::OrderId).uuid().not_null())
                        .col(ColumnDef::new(Payments::LineId).uuid().not_null())
                        .col(
                            ColumnDef::new(Payments::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(Payments::Amount).decimal().not_null())
                        .col(ColumnDef::new(Payments::Method).string().not_null())
                        .col(ColumnDef::new(Payments::Status).string().not_null())
                        .col(
                            ColumnDef::new(Payments::IsPartial)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Payments::IsFinal)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Payments::PaymentDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Payments::IsEdited)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Payments::IsDeleted)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Payments::DeletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Payments::DeletedBy).uuid().null())
                        .col(
                            ColumnDef::new(Payments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Payments::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payments_order_id")
                        .table(Payments::Table)
                        .col(Payments::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Payments::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Payments {
        Table,
        Id,
        OrderId,
        LineId,
        Version,
        Amount,
        Method,
        Status,
        IsPartial,
        IsFinal,
        PaymentDate,
        IsEdited,
        IsDeleted,
        DeletedAt,
        DeletedBy,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000009_create_refund_expenses_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000009_create_refund_expenses_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(RefundExpenses::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(RefundExpenses::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(RefundExpenses::OrderId).uuid().not_null())
                        .col(ColumnDef::new(RefundExpenses::Amount).decimal().not_null())
                        .col(ColumnDef::new(RefundExpenses::Note).string().not_null())
                        .col(
                            ColumnDef::new(RefundExpenses::ExpenseCategory)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(RefundExpenses::CreatedBy).uuid().null())
                        .col(
                            ColumnDef::new(RefundExpenses::CreatedAt)
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
                        .name("idx_refund_expenses_order_id")
                        .table(RefundExpenses::Table)
                        .col(RefundExpenses::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(RefundExpenses::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum RefundExpenses {
        Table,
        Id,
        OrderId,
        Amount,
        Note,
        ExpenseCategory,
        CreatedBy,
        CreatedAt,
    }
}

mod m20240101_000010_create_sequence_counters_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000010_create_sequence_counters_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SequenceCounters::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SequenceCounters::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SequenceCounters::BranchId).uuid().not_null())
                        .col(ColumnDef::new(SequenceCounters::Kind).string().not_null())
                        .col(
                            ColumnDef::new(SequenceCounters::Period)
                                .string()
                                .not_null()
                                .default(""),
                        )
                        .col(
                            ColumnDef::new(SequenceCounters::LastValue)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SequenceCounters::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // One counter row per scope; the row lock on it serializes issuance
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sequence_counters_scope")
                        .table(SequenceCounters::Table)
                        .col(SequenceCounters::BranchId)
                        .col(SequenceCounters::Kind)
                        .col(SequenceCounters::Period)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SequenceCounters::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum SequenceCounters {
        Table,
        Id,
        BranchId,
        Kind,
        Period,
        LastValue,
        UpdatedAt,
    }
}

mod m20240101_000011_create_order_progress_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000011_create_order_progress_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OrderProgress::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderProgress::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderProgress::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderProgress::Status).string().not_null())
                        .col(ColumnDef::new(OrderProgress::ChangedBy).uuid().null())
                        .col(
                            ColumnDef::new(OrderProgress::ChangedAt)
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
                        .name("idx_order_progress_order_id")
                        .table(OrderProgress::Table)
                        .col(OrderProgress::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderProgress::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum OrderProgress {
        Table,
        Id,
        OrderId,
        Status,
        ChangedBy,
        ChangedAt,
    }
}

mod m20240101_000012_create_mnt_records_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000012_create_mnt_records_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(MntRecords::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(MntRecords::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(MntRecords::OrderId).uuid().not_null())
                        .col(ColumnDef::new(MntRecords::BranchId).uuid().not_null())
                        .col(ColumnDef::new(MntRecords::MntNumber).string().not_null())
                        .col(ColumnDef::new(MntRecords::Reason).string().null())
                        .col(ColumnDef::new(MntRecords::CreatedBy).uuid().null())
                        .col(
                            ColumnDef::new(MntRecords::CreatedAt)
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
                        .name("idx_mnt_records_order_id")
                        .table(MntRecords::Table)
                        .col(MntRecords::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(MntRecords::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum MntRecords {
        Table,
        Id,
        OrderId,
        BranchId,
        MntNumber,
        Reason,
        CreatedBy,
        CreatedAt,
    }
}
