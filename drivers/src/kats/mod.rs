// Licensed under the Apache-2.0 license

mod cmac_kat;

pub use cmac_kat::execute_cmac_kat;
