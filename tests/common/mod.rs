//! Shared schema and helpers for the integration tests.
//!
//! - User has_many addresses, has_one profile, belongs_to_many roles
//! - Address belongs_to User and Country
//! - Country has_many addresses

#![allow(dead_code)]

use tidemark::mock::MockExecutor;
use tidemark::{Context, EntityDef, Schema};

pub fn schema() -> Schema {
    Schema::new()
        .register(
            EntityDef::builder("User", "users")
                .attributes(["name", "email"])
                .has_many("addresses", "Address")
                .relation("addresses_by_kind", |r| {
                    Some(r.has_many("Address").index_by("kind").into())
                })
                .has_one("profile", "Profile")
                .relation("profile_or_blank", |r| {
                    Some(r.has_one("Profile").empty_when_missing().into())
                })
                .belongs_to_many("roles", "Role")
                .relation("broken", |_| None)
                .relation("ghosts", |r| Some(r.has_many("Ghost").into()))
                .scope("named", |q| Ok(q.where_not_null("name")))
                .build(),
        )
        .register(
            EntityDef::builder("Address", "addresses")
                .attributes(["user_id", "country_id", "kind", "city"])
                .belongs_to("user", "User")
                .belongs_to("country", "Country")
                .build(),
        )
        .register(
            EntityDef::builder("Country", "countries")
                .attributes(["code"])
                .has_many("addresses", "Address")
                .build(),
        )
        .register(EntityDef::builder("Profile", "profiles").attributes(["user_id", "bio"]).build())
        .register(EntityDef::builder("Role", "roles").attributes(["label"]).build())
}

pub fn context(mock: &MockExecutor) -> Context {
    Context::builder(schema()).default_connection(mock.clone()).build()
}
