fn main() {
    // binfmt_misc only exists on linux kernels
    #[cfg(not(any(target_os = "android", target_os = "linux")))]
    compile_error!("Building binfmt-misc for an unsupported platform. Currently only linux and android are supported")
}
