//! Built-in provider and identity kinds.
//!
//! These are the kinds that work without speaking to any cloud API: static
//! key material from configuration, key material from the process
//! environment, and an AWS profile identity that repackages upstream
//! credentials for consumption by AWS tooling. Cloud-API-backed kinds (SSO,
//! SAML, device code, ...) live in the embedding tool and are registered
//! through the same factory.

mod access_key;
mod aws_profile;
mod environment;

pub use access_key::StaticKeyProvider;
pub use aws_profile::AwsProfileIdentity;
pub use environment::EnvironmentProvider;

use crate::factory::Factory;
use crate::identity::Identity;
use crate::provider::Provider;

pub(crate) fn register_builtin_kinds(factory: &mut Factory) {
    factory.register_provider_kind(
        access_key::KIND,
        Box::new(|name, config| {
            StaticKeyProvider::from_config(name, config).map(|p| Box::new(p) as Box<dyn Provider>)
        }),
    );
    factory.register_provider_kind(
        environment::KIND,
        Box::new(|name, config| {
            EnvironmentProvider::from_config(name, config)
                .map(|p| Box::new(p) as Box<dyn Provider>)
        }),
    );
    factory.register_identity_kind(
        aws_profile::KIND,
        false,
        Box::new(|name, config| {
            AwsProfileIdentity::from_config(name, config)
                .map(|i| Box::new(i) as Box<dyn Identity>)
        }),
    );
}
