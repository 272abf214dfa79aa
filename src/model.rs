pub mod member {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "member")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,

        #[sea_orm(unique)]
        pub telegram_id: i64,

        #[sea_orm(column_type = "Text")]
        pub username: String,
        pub allowed: bool,
    }

    #[derive(Debug, DeriveRelation, EnumIter)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod title {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "title")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,

        /// Trimmed name as first proposed
        #[sea_orm(column_type = "Text")]
        pub name: String,

        /// Lowercased name; the unique index makes names case-insensitive
        #[sea_orm(column_type = "Text", unique)]
        pub name_key: String,

        pub owned: bool,
        pub creator_id: i32,
        pub created_at: DateTimeUtc,
    }

    #[derive(Debug, DeriveRelation, EnumIter)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    /// Key under which a (trimmed) name is looked up.
    pub fn name_key(name: &str) -> String {
        name.trim().to_lowercase()
    }
}

pub mod tally {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "tally")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub title_id: i32,

        pub count: i64,
    }

    #[derive(Debug, DeriveRelation, EnumIter)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod vote {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "vote")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,

        pub title_id: i32,
        pub member_id: i32,

        pub created_at: DateTimeUtc,
    }

    #[derive(Debug, DeriveRelation, EnumIter)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod activity {
    use std::{fmt, str::FromStr};

    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "activity")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,

        pub member_id: i32,

        /// One of [`Action`], stored by name
        #[sea_orm(column_type = "Text")]
        pub action: String,
        pub title_id: i32,

        pub created_at: DateTimeUtc,
    }

    #[derive(Debug, DeriveRelation, EnumIter)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    /// Gated actions recorded in the ledger
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum Action {
        Added,
        Voted,
    }

    impl Action {
        pub fn as_str(self) -> &'static str {
            match self {
                Self::Added => "added",
                Self::Voted => "voted",
            }
        }
    }

    impl fmt::Display for Action {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    impl FromStr for Action {
        type Err = String;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s {
                "added" => Ok(Self::Added),
                "voted" => Ok(Self::Voted),
                other => Err(format!("unknown action {other:?}")),
            }
        }
    }

    impl Model {
        pub fn kind(&self) -> Option<Action> {
            self.action.parse().ok()
        }
    }
}
