mod event;
mod read_model;

use proc_macro::TokenStream;

// ============================================================================
// #[derive(Event)]
// ============================================================================

/// Derive macro implementing `sourced_bus::Event` for a plain data struct.
///
/// # Usage
///
/// ```ignore
/// #[derive(Debug, Clone, Default, Serialize, Deserialize, Event)]
/// #[event(name = "InviteCreated")]
/// pub struct InviteCreated {
///     #[event(aggregate_id)]
///     pub invitation_id: String,
///     pub name: String,
/// }
/// ```
///
/// - `#[event(name = "...")]` sets the wire type name (defaults to the struct name).
/// - `#[event(aggregate_id)]` marks the identifier field; without it a field
///   named `aggregate_id` or `id` is used. The field must implement `ToString`.
///
/// The struct must also implement `Serialize + Deserialize` so the blanket
/// `EventCodec` implementation applies.
#[proc_macro_derive(Event, attributes(event))]
pub fn derive_event(input: TokenStream) -> TokenStream {
    event::derive_event(input)
}

// ============================================================================
// #[derive(ReadModel)]
// ============================================================================

/// Derive macro implementing `sourced_bus::ReadModel`.
///
/// ```ignore
/// #[derive(Clone, Serialize, Deserialize, ReadModel)]
/// #[readmodel(collection = "invitations")]
/// pub struct Invitation {
///     #[readmodel(id)]
///     pub id: String,
///     pub status: String,
/// }
/// ```
#[proc_macro_derive(ReadModel, attributes(readmodel))]
pub fn derive_read_model(input: TokenStream) -> TokenStream {
    read_model::derive_read_model(input)
}
