use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "players")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub username: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::score_events::Entity")]
    ScoreEvents,
    #[sea_orm(has_one = "super::player_scores::Entity")]
    PlayerScores,
}

impl Related<super::score_events::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ScoreEvents.def()
    }
}

impl Related<super::player_scores::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PlayerScores.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
