pub mod kvmconfig;
