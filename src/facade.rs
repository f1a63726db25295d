//! Per-namespace facades (C10).
//!
//! Grounded on `dllexports::data_mgmt::{MultiFileContainer, SingleFileContainer}`: narrow,
//! `Box<dyn Trait>`-free traits each scoped to one responsibility. A facade here is the same
//! shape, generalized from "one container" to "one namespace of a shared `Volume`" — every path
//! argument is implicitly scoped to the facade's namespace so callers stop repeating it.

use std::io::{Read, Seek};

use crate::error::Result;
use crate::path::Namespace;
use crate::volume::Volume;

macro_rules! define_facade {
    ($name:ident, $namespace:expr) => {
        pub struct $name<'a, S> {
            volume: &'a mut Volume<S>,
        }
        impl<'a, S> $name<'a, S> {
            pub fn list_children(&self, path: &str) -> Result<Vec<String>> {
                self.volume.list_children(path, $namespace)
            }

            pub fn walk(&self) -> Vec<String> {
                self.volume.walk($namespace)
            }

            pub fn rm_file(&mut self, path: &str) -> Result<()> {
                self.volume.rm_hard_link($namespace, path)
            }
        }
        impl<'a, S: Read + Seek> $name<'a, S> {
            pub fn get_file(&mut self, path: &str) -> Result<Vec<u8>> {
                // Every namespace currently resolves through the ISO9660 payload index; this is
                // correct as long as a namespace-only file still has an ISO9660-reachable
                // payload, which `add_fp` guarantees by always creating one shared node.
                self.volume.get_file_from_iso(path)
            }
        }
    };
}

define_facade!(Iso9660Facade, Namespace::Iso9660);
define_facade!(RockRidgeFacade, Namespace::RockRidge);
define_facade!(JolietFacade, Namespace::Joliet);
define_facade!(UdfFacade, Namespace::Udf);

impl<S> Volume<S> {
    pub fn get_iso9660_facade(&mut self) -> Iso9660Facade<'_, S> {
        Iso9660Facade { volume: self }
    }

    pub fn get_rock_ridge_facade(&mut self) -> RockRidgeFacade<'_, S> {
        RockRidgeFacade { volume: self }
    }

    pub fn get_joliet_facade(&mut self) -> JolietFacade<'_, S> {
        JolietFacade { volume: self }
    }

    pub fn get_udf_facade(&mut self) -> UdfFacade<'_, S> {
        UdfFacade { volume: self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use crate::volume::Namespaces;

    #[test]
    fn facade_scopes_calls_to_its_namespace() {
        let mut volume = Volume::<Cursor<Vec<u8>>>::new("VOL", Namespaces::default()).unwrap();
        volume.add_fp(Cursor::new(b"x".to_vec()), 1, Some("/A.TXT"), None, None).unwrap();
        let facade = volume.get_iso9660_facade();
        assert_eq!(facade.list_children("/").unwrap(), vec!["A.TXT".to_string()]);
    }
}
