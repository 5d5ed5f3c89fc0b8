// 构建脚本: 链接 ez-ffmpeg 静态库所需的系统依赖
fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // 仅在Windows MSVC环境下添加FFmpeg相关库
    #[cfg(all(target_os = "windows", target_env = "msvc"))]
    {
        // x264 编码器 (vcpkg 静态 FFmpeg 依赖)
        println!("cargo:rustc-link-lib=dylib=libx264");

        // 媒体基础与 VFW (文件解复用)
        println!("cargo:rustc-link-lib=dylib=oleaut32");
        println!("cargo:rustc-link-lib=dylib=vfw32");

        // Secure Channel (https 输入源)
        println!("cargo:rustc-link-lib=dylib=secur32");
    }
}
