//! Diesel table definitions for the PostgreSQL schema.
//!
//! These must match `backend/migrations` exactly; regenerate with
//! `diesel print-schema` after changing a migration.

diesel::table! {
    /// Local users mirrored on a tracking server.
    users (id) {
        id -> Int8,
        email -> Varchar,
        /// Identity provider subject; unique per user.
        auth_subject -> Varchar,
        remote_user_id -> Int8,
        server_url -> Varchar,
        display_name -> Nullable<Varchar>,
        phone -> Nullable<Varchar>,
        session_token -> Nullable<Text>,
        push_token -> Nullable<Text>,
        country_code -> Nullable<Varchar>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Stocked devices and their current assignment.
    device_inventory (id) {
        id -> Int8,
        imei -> Varchar,
        sim_iccid -> Varchar,
        remote_device_id -> Int8,
        server_url -> Varchar,
        /// Owning local user; null while the device is in stock.
        assigned_user_id -> Nullable<Int8>,
        label -> Nullable<Varchar>,
        preloaded_months -> Int4,
        expiration -> Nullable<Timestamptz>,
        brand -> Nullable<Varchar>,
        model -> Nullable<Varchar>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Tracking server responsible for each country.
    country_servers (country_code) {
        country_code -> Varchar,
        server_url -> Varchar,
    }
}

diesel::joinable!(device_inventory -> users (assigned_user_id));

diesel::allow_tables_to_appear_in_same_query!(country_servers, device_inventory, users);
